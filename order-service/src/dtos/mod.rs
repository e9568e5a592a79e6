//! Inbound command payloads and reply shapes.
//!
//! Every command payload is a typed, schema-validated struct; validation
//! runs at the dispatcher boundary before any core logic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{Order, OrderStatus};

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// Zero is allowed (free items); negative prices are not.
fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_must_not_be_negative"));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<(), ValidationError> {
    if OrderStatus::parse(status).is_none() {
        let mut err = ValidationError::new("unknown_status");
        err.message = Some(
            format!(
                "Possible status values are: {}",
                OrderStatus::ALL.map(|s| s.as_str()).join(", ")
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// One requested line of a new order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    #[validate(range(min = 1, message = "productId must be positive"))]
    pub product_id: i64,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
}

/// `createOrder` command payload.
///
/// `status` and `paid` are accepted for wire compatibility but may only
/// restate the initial state.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderDto {
    #[validate(length(min = 1, message = "order must contain at least one item"), nested)]
    pub items: Vec<OrderItemDto>,
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
    pub paid: Option<bool>,
}

/// `findAllOrders` command payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaginationDto {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page is 1-indexed"))]
    pub page: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, message = "limit must be positive"))]
    pub limit: i64,
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
}

/// `changeOrderStatus` command payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrderStatusDto {
    pub id: Uuid,
    #[validate(custom(function = "validate_status"))]
    pub status: String,
}

/// `payment.succeeded` event payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaidOrderDto {
    pub order_id: Uuid,
    #[validate(url(message = "receiptUrl must be a valid URL"))]
    pub receipt_url: String,
    #[validate(length(min = 1, message = "paymentReference must not be empty"))]
    pub payment_reference: String,
}

/// Line item decorated with the transient catalog product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemWithName {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
    pub product_name: Option<String>,
}

/// Order reply shape: the persisted order plus its hydrated items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub order_items: Vec<OrderItemWithName>,
}

/// `createOrder` reply: the order and the opaque payment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    pub payment_session: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: i64,
    pub last_page: i64,
    pub page: i64,
}

/// `findAllOrders` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedOrdersResponse {
    pub data: Vec<Order>,
    pub meta: PageMeta,
}
