//! Product validation client.
//!
//! One batched round trip to the catalog service per lookup. The catalog
//! is authoritative for product existence, name, and current price.

use crate::services::metrics::{BUS_REQUESTS_TOTAL, BUS_REQUEST_DURATION};
use crate::services::pricing::ValidatedProduct;
use async_trait::async_trait;
use service_core::bus::retry::{retry_request, RetryConfig};
use service_core::bus::BusClient;
use service_core::error::AppError;
use tracing::instrument;

/// Subject served by the product catalog.
pub const VALIDATE_PRODUCTS_SUBJECT: &str = "validate_products";

#[async_trait]
pub trait ProductValidator: Send + Sync {
    /// Resolve `{id, name, price}` for each id the catalog knows.
    ///
    /// The result set is not guaranteed to cover the request set; ids the
    /// catalog does not recognize are simply absent.
    async fn validate(&self, ids: &[i64]) -> Result<Vec<ValidatedProduct>, AppError>;
}

/// Catalog client over the message bus, with timeout and bounded retry.
#[derive(Clone)]
pub struct NatsProductValidator {
    bus: BusClient,
    retry: RetryConfig,
}

impl NatsProductValidator {
    pub fn new(bus: BusClient, retry: RetryConfig) -> Self {
        Self { bus, retry }
    }
}

#[async_trait]
impl ProductValidator for NatsProductValidator {
    #[instrument(skip(self), fields(count = ids.len()))]
    async fn validate(&self, ids: &[i64]) -> Result<Vec<ValidatedProduct>, AppError> {
        let timer = BUS_REQUEST_DURATION
            .with_label_values(&[VALIDATE_PRODUCTS_SUBJECT])
            .start_timer();

        let result = retry_request(&self.retry, VALIDATE_PRODUCTS_SUBJECT, || {
            self.bus
                .request_json::<[i64], Vec<ValidatedProduct>>(VALIDATE_PRODUCTS_SUBJECT, ids)
        })
        .await;

        timer.observe_duration();

        match result {
            Ok(products) => {
                BUS_REQUESTS_TOTAL
                    .with_label_values(&[VALIDATE_PRODUCTS_SUBJECT, "ok"])
                    .inc();
                Ok(products)
            }
            Err(err) => {
                BUS_REQUESTS_TOTAL
                    .with_label_values(&[VALIDATE_PRODUCTS_SUBJECT, "error"])
                    .inc();
                Err(AppError::UpstreamUnavailable(format!(
                    "product catalog: {}",
                    err
                )))
            }
        }
    }
}
