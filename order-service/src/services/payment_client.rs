//! Payment service client.
//!
//! Initiates a payment session for a persisted order. The session
//! descriptor is opaque to this service and returned unmodified.

use crate::services::metrics::{BUS_REQUESTS_TOTAL, BUS_REQUEST_DURATION};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::bus::retry::{retry_request, RetryConfig};
use service_core::bus::BusClient;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

/// Subject served by the payment service.
pub const CREATE_PAYMENT_SESSION_SUBJECT: &str = "create_payment_session";

/// Line summary sent to the payment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionItem {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

/// Payment session request for a persisted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
    pub order_id: Uuid,
    pub currency: String,
    pub items: Vec<PaymentSessionItem>,
}

impl PaymentSessionRequest {
    /// Sessions are initiated in USD only; multi-currency is out of scope.
    pub fn usd(order_id: Uuid, items: Vec<PaymentSessionItem>) -> Self {
        Self {
            order_id,
            currency: "usd".to_string(),
            items,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a payment session. Callers must only invoke this after the
    /// order is durably persisted.
    async fn create_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<serde_json::Value, AppError>;
}

/// Payment client over the message bus, with timeout and bounded retry.
#[derive(Clone)]
pub struct NatsPaymentGateway {
    bus: BusClient,
    retry: RetryConfig,
}

impl NatsPaymentGateway {
    pub fn new(bus: BusClient, retry: RetryConfig) -> Self {
        Self { bus, retry }
    }
}

#[async_trait]
impl PaymentGateway for NatsPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<serde_json::Value, AppError> {
        let timer = BUS_REQUEST_DURATION
            .with_label_values(&[CREATE_PAYMENT_SESSION_SUBJECT])
            .start_timer();

        let result = retry_request(&self.retry, CREATE_PAYMENT_SESSION_SUBJECT, || {
            self.bus
                .request_json::<PaymentSessionRequest, serde_json::Value>(
                    CREATE_PAYMENT_SESSION_SUBJECT,
                    request,
                )
        })
        .await;

        timer.observe_duration();

        match result {
            Ok(session) => {
                BUS_REQUESTS_TOTAL
                    .with_label_values(&[CREATE_PAYMENT_SESSION_SUBJECT, "ok"])
                    .inc();
                Ok(session)
            }
            Err(err) => {
                BUS_REQUESTS_TOTAL
                    .with_label_values(&[CREATE_PAYMENT_SESSION_SUBJECT, "error"])
                    .inc();
                Err(AppError::UpstreamUnavailable(format!(
                    "payment service: {}",
                    err
                )))
            }
        }
    }
}
