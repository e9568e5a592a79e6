//! Test doubles and a service harness for order-service integration tests.
//!
//! The orchestration service is exercised through its public API against
//! in-memory collaborators, so these tests need no live Postgres or NATS.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use order_service::dtos::OrderItemDto;
use order_service::models::{NewOrder, NewOrderItem, Order, OrderItem, OrderReceipt, OrderStatus};
use order_service::services::payment_client::{PaymentGateway, PaymentSessionRequest};
use order_service::services::pricing::{PricingPolicy, ValidatedProduct};
use order_service::services::product_client::ProductValidator;
use order_service::services::repository::{
    last_page, page_offset, OrderPage, OrderStore, OrderWithItems, PaidOutcome,
};
use order_service::services::OrdersService;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory order store mirroring the repository contract, including the
/// conditional reconciliation write.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<Vec<OrderWithItems>>,
    receipts: Mutex<Vec<OrderReceipt>>,
    writes: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<OrderWithItems> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.order.id == id)
            .cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_with_items(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderWithItems, AppError> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let order = Order {
            id,
            total_amount: order.total_amount,
            total_items: order.total_items,
            status: order.status.as_str().to_string(),
            paid: false,
            paid_at: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        };
        let items = items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                subtotal: item.subtotal,
            })
            .collect();

        let created = OrderWithItems { order, items };
        self.orders.lock().unwrap().push(created.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, AppError> {
        Ok(self.get(id))
    }

    async fn find_page(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, AppError> {
        let orders = self.orders.lock().unwrap();
        let filtered: Vec<Order> = orders
            .iter()
            .map(|entry| entry.order.clone())
            .filter(|order| status.map_or(true, |s| order.status == s.as_str()))
            .collect();
        let total = filtered.len() as i64;
        let slice = filtered
            .into_iter()
            .skip(page_offset(page, limit) as usize)
            .take(limit as usize)
            .collect();

        Ok(OrderPage {
            orders: slice,
            total,
            last_page: last_page(total, limit),
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<Option<Order>, AppError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.iter_mut().find(|entry| entry.order.id == id) {
            Some(entry) => {
                entry.order.status = status.as_str().to_string();
                entry.order.updated_at = Utc::now();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(Some(entry.order.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        payment_reference: &str,
        receipt_url: &str,
    ) -> Result<PaidOutcome, AppError> {
        let mut orders = self.orders.lock().unwrap();
        let Some(entry) = orders.iter_mut().find(|entry| entry.order.id == id) else {
            return Ok(PaidOutcome::NotFound);
        };

        if entry.order.paid {
            return Ok(PaidOutcome::AlreadyPaid(entry.order.clone()));
        }

        entry.order.status = OrderStatus::Paid.as_str().to_string();
        entry.order.paid = true;
        entry.order.paid_at = Some(Utc::now());
        entry.order.payment_reference = Some(payment_reference.to_string());
        entry.order.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.receipts.lock().unwrap().push(OrderReceipt {
            id: Uuid::new_v4(),
            order_id: id,
            receipt_url: receipt_url.to_string(),
            created_at: Utc::now(),
        });

        Ok(PaidOutcome::Updated(entry.order.clone()))
    }
}

/// Catalog stub answering from a fixed product list.
pub struct StubCatalog {
    products: Vec<ValidatedProduct>,
    calls: AtomicUsize,
}

impl StubCatalog {
    pub fn with_products(products: Vec<ValidatedProduct>) -> Arc<Self> {
        Arc::new(Self {
            products,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::with_products(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductValidator for StubCatalog {
    async fn validate(&self, ids: &[i64]) -> Result<Vec<ValidatedProduct>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .products
            .iter()
            .filter(|product| ids.contains(&product.id))
            .cloned()
            .collect())
    }
}

/// Payment gateway stub returning a fixed session descriptor.
pub struct StubPaymentGateway {
    fail: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<PaymentSessionRequest>>,
}

impl StubPaymentGateway {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PaymentSessionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for StubPaymentGateway {
    async fn create_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<serde_json::Value, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if self.fail {
            return Err(AppError::UpstreamUnavailable(
                "payment service: no responders".to_string(),
            ));
        }

        Ok(serde_json::json!({
            "id": "cs_test_123",
            "url": format!("https://payments.test/session/{}", request.order_id),
        }))
    }
}

pub fn widget_catalog() -> Arc<StubCatalog> {
    StubCatalog::with_products(vec![ValidatedProduct {
        id: 1,
        name: "Widget".to_string(),
        price: Decimal::new(7, 0),
    }])
}

pub fn service(
    store: Arc<InMemoryOrderStore>,
    catalog: Arc<StubCatalog>,
    payments: Arc<StubPaymentGateway>,
) -> OrdersService {
    service_with_policy(store, catalog, payments, true)
}

pub fn service_with_policy(
    store: Arc<InMemoryOrderStore>,
    catalog: Arc<StubCatalog>,
    payments: Arc<StubPaymentGateway>,
    client_price_fallback: bool,
) -> OrdersService {
    OrdersService::new(
        store,
        catalog,
        payments,
        PricingPolicy {
            client_price_fallback,
        },
    )
}

pub fn item(product_id: i64, quantity: i32, price: i64) -> OrderItemDto {
    OrderItemDto {
        product_id,
        quantity,
        price: Decimal::new(price, 0),
    }
}
