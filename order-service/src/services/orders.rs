//! Order orchestration: pricing, atomic persistence, payment-session
//! initiation, status transitions, and payment reconciliation.

use crate::dtos::{
    ChangeOrderStatusDto, CreateOrderDto, CreateOrderResponse, OrderItemWithName,
    OrderPaginationDto, OrderResponse, PageMeta, PaginatedOrdersResponse, PaidOrderDto,
};
use crate::models::{NewOrder, Order, OrderStatus};
use crate::services::metrics::{ORDERS_TOTAL, RECEIPTS_TOTAL};
use crate::services::payment_client::{PaymentGateway, PaymentSessionItem, PaymentSessionRequest};
use crate::services::pricing::{self, PricingPolicy, ValidatedProduct};
use crate::services::product_client::ProductValidator;
use crate::services::repository::{OrderStore, OrderWithItems, PaidOutcome};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct OrdersService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductValidator>,
    payments: Arc<dyn PaymentGateway>,
    policy: PricingPolicy,
}

/// Attach transient product names to the persisted items for the reply.
fn hydrate(persisted: OrderWithItems, products: &[ValidatedProduct]) -> OrderResponse {
    let OrderWithItems { order, items } = persisted;
    OrderResponse {
        order,
        order_items: items
            .into_iter()
            .map(|item| OrderItemWithName {
                product_name: pricing::product_name(products, item.product_id),
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                subtotal: item.subtotal,
            })
            .collect(),
    }
}

impl OrdersService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn ProductValidator>,
        payments: Arc<dyn PaymentGateway>,
        policy: PricingPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            payments,
            policy,
        }
    }

    /// Price the requested items against the catalog, persist the order
    /// atomically, then initiate a payment session.
    ///
    /// The session is requested only after the order is durable; a payment
    /// outage therefore never loses the order, and that failure mode is
    /// reported distinctly so callers can tell it from "order not created".
    #[instrument(skip(self, dto), fields(items = dto.items.len()))]
    pub async fn create(&self, dto: CreateOrderDto) -> Result<CreateOrderResponse, AppError> {
        // The optional wire fields may only restate the initial state.
        if let Some(status) = dto.status.as_deref() {
            if OrderStatus::parse(status) != Some(OrderStatus::Pending) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "New orders must start as {}",
                    OrderStatus::Pending
                )));
            }
        }
        if dto.paid == Some(true) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "New orders cannot start paid"
            )));
        }

        let ids = pricing::distinct_product_ids(&dto.items);
        let products = self.catalog.validate(&ids).await?;

        let priced = pricing::price_order(&dto.items, &products, self.policy)?;

        let persisted = self
            .store
            .create_with_items(
                NewOrder {
                    total_amount: priced.total_amount,
                    total_items: priced.total_items,
                    status: OrderStatus::Pending,
                },
                priced.items,
            )
            .await?;

        ORDERS_TOTAL
            .with_label_values(&[OrderStatus::Pending.as_str()])
            .inc();
        info!(
            order_id = %persisted.order.id,
            total_amount = %persisted.order.total_amount,
            "Order persisted"
        );

        let session_items = persisted
            .items
            .iter()
            .map(|item| PaymentSessionItem {
                name: pricing::product_name(&products, item.product_id)
                    .unwrap_or_else(|| format!("Product {}", item.product_id)),
                price: item.price,
                quantity: item.quantity,
            })
            .collect();

        let order_id = persisted.order.id;
        let payment_session = self
            .payments
            .create_session(&PaymentSessionRequest::usd(order_id, session_items))
            .await
            .map_err(|err| AppError::PaymentSessionFailed {
                order_id,
                cause: anyhow::Error::new(err),
            })?;

        Ok(CreateOrderResponse {
            order: hydrate(persisted, &products),
            payment_session,
        })
    }

    /// Paginated, optionally status-filtered listing. List rows do not
    /// carry items.
    #[instrument(skip(self, dto), fields(page = dto.page, limit = dto.limit))]
    pub async fn find_all(
        &self,
        dto: OrderPaginationDto,
    ) -> Result<PaginatedOrdersResponse, AppError> {
        let status = dto.status.as_deref().and_then(OrderStatus::parse);
        let page = self.store.find_page(status, dto.page, dto.limit).await?;

        Ok(PaginatedOrdersResponse {
            data: page.orders,
            meta: PageMeta {
                total: page.total,
                last_page: page.last_page,
                page: dto.page,
            },
        })
    }

    /// Point lookup with transient product-name hydration.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn find_one(&self, id: Uuid) -> Result<OrderResponse, AppError> {
        // NotFound is decided before any catalog traffic.
        let persisted = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order with id {} not found", id)))?;

        let mut ids: Vec<i64> = persisted.items.iter().map(|item| item.product_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let products = self.catalog.validate(&ids).await?;

        Ok(hydrate(persisted, &products))
    }

    /// Manual status transition. A same-status request is a no-op that
    /// performs zero writes; paid state is never touched here.
    #[instrument(skip(self, dto), fields(order_id = %dto.id, status = %dto.status))]
    pub async fn change_status(&self, dto: ChangeOrderStatusDto) -> Result<Order, AppError> {
        let status = OrderStatus::parse(&dto.status).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Unknown status: {}", dto.status))
        })?;

        let existing = self.store.find_by_id(dto.id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Order with id {} not found", dto.id))
        })?;

        if existing.order.status == status.as_str() {
            return Ok(existing.order);
        }

        let updated = self
            .store
            .update_status(dto.id, status)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Order with id {} not found", dto.id))
            })?;

        ORDERS_TOTAL.with_label_values(&[status.as_str()]).inc();

        Ok(updated)
    }

    /// Apply a payment-succeeded event.
    ///
    /// The store transition is conditional on the order being unpaid, so
    /// redelivered events (at-least-once transport) settle as no-ops.
    #[instrument(skip(self, dto), fields(order_id = %dto.order_id))]
    pub async fn mark_paid(&self, dto: PaidOrderDto) -> Result<(), AppError> {
        match self
            .store
            .mark_paid(dto.order_id, &dto.payment_reference, &dto.receipt_url)
            .await?
        {
            PaidOutcome::Updated(order) => {
                ORDERS_TOTAL
                    .with_label_values(&[OrderStatus::Paid.as_str()])
                    .inc();
                RECEIPTS_TOTAL.inc();
                info!(
                    order_id = %order.id,
                    payment_reference = %dto.payment_reference,
                    "Payment reconciled"
                );
                Ok(())
            }
            PaidOutcome::AlreadyPaid(order) => {
                info!(order_id = %order.id, "Payment already reconciled, skipping");
                Ok(())
            }
            PaidOutcome::NotFound => Err(AppError::NotFound(anyhow::anyhow!(
                "Order with id {} not found",
                dto.order_id
            ))),
        }
    }
}
