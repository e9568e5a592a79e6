//! Order repository: persistence contract and PostgreSQL implementation.
//!
//! The store is an injected abstraction, constructed once at startup and
//! passed explicitly to the orchestration service.

use crate::models::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

/// An order together with its owned line items.
#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// One page of orders plus pagination metadata.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
    pub last_page: i64,
}

/// Outcome of a payment reconciliation write.
#[derive(Debug, Clone)]
pub enum PaidOutcome {
    /// The order transitioned to paid and its receipt was attached.
    Updated(Order),
    /// The order was reconciled earlier; nothing was written.
    AlreadyPaid(Order),
    NotFound,
}

/// ceil(total / limit); 0 for an empty result set.
pub fn last_page(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// Offset for a 1-indexed page.
pub fn page_offset(page: i64, limit: i64) -> i64 {
    limit * (page - 1)
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create the order row and all item rows in one transaction; partial
    /// writes are never observable.
    async fn create_with_items(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderWithItems, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, AppError>;

    async fn find_page(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, AppError>;

    async fn update_status(&self, id: Uuid, status: OrderStatus)
        -> Result<Option<Order>, AppError>;

    /// Conditional reconciliation write: only an unpaid order transitions,
    /// so redelivered payment events are absorbed.
    async fn mark_paid(
        &self,
        id: Uuid,
        payment_reference: &str,
        receipt_url: &str,
    ) -> Result<PaidOutcome, AppError>;
}

const ORDER_COLUMNS: &str =
    "id, total_amount, total_items, status, paid, paid_at, payment_reference, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
        sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, price, subtotal
            FROM order_items
            WHERE order_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!("Failed to fetch order items: {}", e)))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order, items), fields(items = items.len()))]
    async fn create_with_items(
        &self,
        order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<OrderWithItems, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_with_items"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let order_id = Uuid::new_v4();
        let created = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (id, total_amount, total_items, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(order.total_amount)
        .bind(order.total_items)
        .bind(order.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!("Failed to create order: {}", e)))?;

        let mut created_items = Vec::with_capacity(items.len());
        for item in &items {
            let row = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, order_id, product_id, quantity, price, subtotal
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.subtotal)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::StorageError(anyhow::anyhow!("Failed to create order item: {}", e))
            })?;
            created_items.push(row);
        }

        tx.commit().await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to commit order: {}", e))
        })?;

        timer.observe_duration();

        info!(
            order_id = %created.id,
            total_amount = %created.total_amount,
            total_items = created.total_items,
            "Order created"
        );

        Ok(OrderWithItems {
            order: created,
            items: created_items,
        })
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_id"])
            .start_timer();

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!("Failed to get order: {}", e)))?;

        let result = match order {
            Some(order) => {
                let items = self.fetch_items(order.id).await?;
                Some(OrderWithItems { order, items })
            }
            None => None,
        };

        timer.observe_duration();

        Ok(result)
    }

    #[instrument(skip(self))]
    async fn find_page(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        limit: i64,
    ) -> Result<OrderPage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_page"])
            .start_timer();

        let status_str = status.map(|s| s.as_str().to_string());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE ($1::varchar IS NULL OR status = $1)
            "#,
        )
        .bind(&status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!("Failed to count orders: {}", e)))?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::varchar IS NULL OR status = $1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&status_str)
        .bind(limit)
        .bind(page_offset(page, limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(anyhow::anyhow!("Failed to list orders: {}", e)))?;

        timer.observe_duration();

        Ok(OrderPage {
            orders,
            total,
            last_page: last_page(total, limit),
        })
    }

    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<Option<Order>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_status"])
            .start_timer();

        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to update order status: {}", e))
        })?;

        timer.observe_duration();

        if let Some(ref order) = order {
            info!(order_id = %order.id, status = %order.status, "Order status updated");
        }

        Ok(order)
    }

    #[instrument(skip(self, payment_reference, receipt_url), fields(order_id = %id))]
    async fn mark_paid(
        &self,
        id: Uuid,
        payment_reference: &str,
        receipt_url: &str,
    ) -> Result<PaidOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_paid"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // paid_at and payment_reference are write-once: the guard on `paid`
        // leaves already-reconciled orders untouched.
        let updated = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET status = $2, paid = TRUE, paid_at = NOW(), payment_reference = $3, updated_at = NOW()
            WHERE id = $1 AND paid = FALSE
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(OrderStatus::Paid.as_str())
        .bind(payment_reference)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::StorageError(anyhow::anyhow!("Failed to reconcile payment: {}", e))
        })?;

        let outcome = match updated {
            Some(order) => {
                sqlx::query(
                    r#"
                    INSERT INTO order_receipts (id, order_id, receipt_url)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (order_id) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(id)
                .bind(receipt_url)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::StorageError(anyhow::anyhow!("Failed to attach receipt: {}", e))
                })?;

                tx.commit().await.map_err(|e| {
                    AppError::StorageError(anyhow::anyhow!(
                        "Failed to commit reconciliation: {}",
                        e
                    ))
                })?;

                info!(order_id = %id, "Payment reconciled, receipt attached");
                PaidOutcome::Updated(order)
            }
            None => {
                let existing = sqlx::query_as::<_, Order>(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::StorageError(anyhow::anyhow!("Failed to get order: {}", e))
                })?;

                tx.rollback().await.ok();

                match existing {
                    Some(order) => PaidOutcome::AlreadyPaid(order),
                    None => PaidOutcome::NotFound,
                }
            }
        };

        timer.observe_duration();

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_is_the_ceiling() {
        assert_eq!(last_page(25, 10), 3);
        assert_eq!(last_page(30, 10), 3);
        assert_eq!(last_page(31, 10), 4);
        assert_eq!(last_page(1, 10), 1);
    }

    #[test]
    fn last_page_of_empty_set_is_zero() {
        assert_eq!(last_page(0, 10), 0);
    }

    #[test]
    fn offset_is_one_indexed() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(2, 7), 7);
    }
}
