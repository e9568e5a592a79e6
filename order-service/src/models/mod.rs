//! Domain models for order-service.

mod order;
mod order_item;
mod receipt;

pub use order::{NewOrder, Order, OrderStatus};
pub use order_item::{NewOrderItem, OrderItem};
pub use receipt::OrderReceipt;
