//! Order pricing and assembly.
//!
//! Pure transformation from requested items plus catalog products to a
//! priced order. No persistence or bus traffic happens here, which keeps
//! the pricing rules unit-testable against a stubbed catalog result.

use crate::dtos::OrderItemDto;
use crate::models::NewOrderItem;
use crate::services::metrics::PRICE_FALLBACKS_TOTAL;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Product as returned by the catalog service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedProduct {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

/// Pricing policy resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    /// Use the caller-supplied price when the catalog omits a product.
    pub client_price_fallback: bool,
}

/// An order priced against the catalog, not yet persisted.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub total_amount: Decimal,
    pub total_items: i32,
    pub items: Vec<NewOrderItem>,
}

/// Distinct product ids in first-seen order, for the batched catalog lookup.
pub fn distinct_product_ids(items: &[OrderItemDto]) -> Vec<i64> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| item.product_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Price every requested item against the catalog result.
///
/// The catalog does not guarantee its result set covers the request set.
/// For an omitted product the caller-supplied price is used when the
/// fallback policy allows it; otherwise the whole order is rejected.
pub fn price_order(
    items: &[OrderItemDto],
    products: &[ValidatedProduct],
    policy: PricingPolicy,
) -> Result<PricedOrder, AppError> {
    let by_id: HashMap<i64, &ValidatedProduct> = products.iter().map(|p| (p.id, p)).collect();

    let mut priced = Vec::with_capacity(items.len());
    let mut total_amount = Decimal::ZERO;
    let mut total_items: i32 = 0;

    for item in items {
        let price = match by_id.get(&item.product_id) {
            Some(product) => product.price,
            None if policy.client_price_fallback => {
                PRICE_FALLBACKS_TOTAL.inc();
                warn!(
                    product_id = item.product_id,
                    client_price = %item.price,
                    "catalog omitted product, using caller-supplied price"
                );
                item.price
            }
            None => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Product {} was not recognized by the catalog",
                    item.product_id
                )))
            }
        };

        let subtotal = price * Decimal::from(item.quantity);
        total_amount += subtotal;
        total_items += item.quantity;

        priced.push(NewOrderItem {
            product_id: item.product_id,
            quantity: item.quantity,
            price,
            subtotal,
        });
    }

    Ok(PricedOrder {
        total_amount,
        total_items,
        items: priced,
    })
}

/// Transient read-side decoration; never persisted.
pub fn product_name(products: &[ValidatedProduct], product_id: i64) -> Option<String> {
    products
        .iter()
        .find(|p| p.id == product_id)
        .map(|p| p.name.clone())
}
