//! Inbound command/event dispatch over the message bus.
//!
//! Thin boundary layer: decode the payload, validate the schema, call the
//! orchestration service, reply with the payload or the error envelope.
//! Each message is handled in its own task, so orders are processed fully
//! concurrently with each other.

use crate::dtos::{ChangeOrderStatusDto, CreateOrderDto, OrderPaginationDto, PaidOrderDto};
use crate::services::metrics::{BUS_REQUESTS_TOTAL, BUS_REQUEST_DURATION, ERRORS_TOTAL};
use crate::services::OrdersService;
use async_nats::{Client, Subject, Subscriber};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Request/response command subjects.
pub const CREATE_ORDER: &str = "createOrder";
pub const FIND_ALL_ORDERS: &str = "findAllOrders";
pub const FIND_ONE_ORDER: &str = "findOneOrder";
pub const CHANGE_ORDER_STATUS: &str = "changeOrderStatus";
/// Fire-and-forget payment event subject.
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

/// Queue group so each event is delivered to one service instance.
const QUEUE_GROUP: &str = "order-service";

/// Subscribe to all command and event subjects and dispatch until the bus
/// connection closes.
pub async fn run(client: Client, service: Arc<OrdersService>) -> Result<(), AppError> {
    let create = subscribe(&client, CREATE_ORDER).await?;
    let find_all = subscribe(&client, FIND_ALL_ORDERS).await?;
    let find_one = subscribe(&client, FIND_ONE_ORDER).await?;
    let change_status = subscribe(&client, CHANGE_ORDER_STATUS).await?;
    let paid = client
        .queue_subscribe(PAYMENT_SUCCEEDED.to_string(), QUEUE_GROUP.to_string())
        .await
        .map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to subscribe to {}: {}", PAYMENT_SUCCEEDED, e))
        })?;

    info!("Order dispatcher listening");

    tokio::try_join!(
        serve_create(client.clone(), service.clone(), create),
        serve_find_all(client.clone(), service.clone(), find_all),
        serve_find_one(client.clone(), service.clone(), find_one),
        serve_change_status(client.clone(), service.clone(), change_status),
        serve_paid(service, paid),
    )?;

    Ok(())
}

async fn subscribe(client: &Client, subject: &str) -> Result<Subscriber, AppError> {
    client.subscribe(subject.to_string()).await.map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to subscribe to {}: {}", subject, e))
    })
}

/// Decode and schema-validate a command payload.
fn decode<T: DeserializeOwned + Validate>(payload: &[u8]) -> Result<T, AppError> {
    let dto: T = serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed payload: {}", e)))?;
    dto.validate()?;
    Ok(dto)
}

fn encode<T: Serialize>(value: T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(&value)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode reply: {}", e)))
}

/// Publish the reply payload, or the error envelope on failure.
async fn respond(
    client: &Client,
    subject: &'static str,
    reply: Option<Subject>,
    result: Result<Vec<u8>, AppError>,
) {
    let (bytes, outcome) = match result {
        Ok(bytes) => (bytes, "ok"),
        Err(err) => {
            warn!(subject = subject, error = %err, "command failed");
            ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
            (
                serde_json::to_vec(&err.envelope()).unwrap_or_default(),
                "error",
            )
        }
    };
    BUS_REQUESTS_TOTAL
        .with_label_values(&[subject, outcome])
        .inc();

    let Some(reply) = reply else {
        warn!(subject = subject, "request carried no reply subject");
        return;
    };

    if let Err(err) = client.publish(reply, bytes.into()).await {
        error!(subject = subject, error = %err, "failed to publish reply");
    }
}

async fn serve_create(
    client: Client,
    service: Arc<OrdersService>,
    mut sub: Subscriber,
) -> Result<(), AppError> {
    while let Some(msg) = sub.next().await {
        let client = client.clone();
        let service = service.clone();
        tokio::spawn(async move {
            let timer = BUS_REQUEST_DURATION
                .with_label_values(&[CREATE_ORDER])
                .start_timer();
            let result = match decode::<CreateOrderDto>(&msg.payload) {
                Ok(dto) => match service.create(dto).await {
                    Ok(response) => encode(response),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            respond(&client, CREATE_ORDER, msg.reply, result).await;
            timer.observe_duration();
        });
    }
    Ok(())
}

async fn serve_find_all(
    client: Client,
    service: Arc<OrdersService>,
    mut sub: Subscriber,
) -> Result<(), AppError> {
    while let Some(msg) = sub.next().await {
        let client = client.clone();
        let service = service.clone();
        tokio::spawn(async move {
            let timer = BUS_REQUEST_DURATION
                .with_label_values(&[FIND_ALL_ORDERS])
                .start_timer();
            let result = match decode::<OrderPaginationDto>(&msg.payload) {
                Ok(dto) => match service.find_all(dto).await {
                    Ok(response) => encode(response),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            respond(&client, FIND_ALL_ORDERS, msg.reply, result).await;
            timer.observe_duration();
        });
    }
    Ok(())
}

async fn serve_find_one(
    client: Client,
    service: Arc<OrdersService>,
    mut sub: Subscriber,
) -> Result<(), AppError> {
    while let Some(msg) = sub.next().await {
        let client = client.clone();
        let service = service.clone();
        tokio::spawn(async move {
            let timer = BUS_REQUEST_DURATION
                .with_label_values(&[FIND_ONE_ORDER])
                .start_timer();
            // The payload is the bare order id.
            let result = match serde_json::from_slice::<Uuid>(&msg.payload) {
                Ok(id) => match service.find_one(id).await {
                    Ok(response) => encode(response),
                    Err(err) => Err(err),
                },
                Err(e) => Err(AppError::BadRequest(anyhow::anyhow!(
                    "Malformed payload: {}",
                    e
                ))),
            };
            respond(&client, FIND_ONE_ORDER, msg.reply, result).await;
            timer.observe_duration();
        });
    }
    Ok(())
}

async fn serve_change_status(
    client: Client,
    service: Arc<OrdersService>,
    mut sub: Subscriber,
) -> Result<(), AppError> {
    while let Some(msg) = sub.next().await {
        let client = client.clone();
        let service = service.clone();
        tokio::spawn(async move {
            let timer = BUS_REQUEST_DURATION
                .with_label_values(&[CHANGE_ORDER_STATUS])
                .start_timer();
            let result = match decode::<ChangeOrderStatusDto>(&msg.payload) {
                Ok(dto) => match service.change_status(dto).await {
                    Ok(order) => encode(order),
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            respond(&client, CHANGE_ORDER_STATUS, msg.reply, result).await;
            timer.observe_duration();
        });
    }
    Ok(())
}

/// Fire-and-forget event loop. There is no caller to report failures to,
/// so every reconciliation failure lands in the log and the error counter.
async fn serve_paid(service: Arc<OrdersService>, mut sub: Subscriber) -> Result<(), AppError> {
    while let Some(msg) = sub.next().await {
        let service = service.clone();
        tokio::spawn(async move {
            let timer = BUS_REQUEST_DURATION
                .with_label_values(&[PAYMENT_SUCCEEDED])
                .start_timer();
            match decode::<PaidOrderDto>(&msg.payload) {
                Ok(dto) => {
                    let order_id = dto.order_id;
                    match service.mark_paid(dto).await {
                        Ok(()) => {
                            BUS_REQUESTS_TOTAL
                                .with_label_values(&[PAYMENT_SUCCEEDED, "ok"])
                                .inc();
                        }
                        Err(err) => {
                            BUS_REQUESTS_TOTAL
                                .with_label_values(&[PAYMENT_SUCCEEDED, "error"])
                                .inc();
                            ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                            error!(
                                order_id = %order_id,
                                error = %err,
                                "payment reconciliation failed"
                            );
                        }
                    }
                }
                Err(err) => {
                    BUS_REQUESTS_TOTAL
                        .with_label_values(&[PAYMENT_SUCCEEDED, "error"])
                        .inc();
                    ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                    error!(error = %err, "discarding malformed payment event");
                }
            }
            timer.observe_duration();
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_camel_case_commands() {
        let dto: CreateOrderDto = decode(
            br#"{"items": [{"productId": 1, "quantity": 2, "price": 5}]}"#,
        )
        .unwrap();
        assert_eq!(dto.items.len(), 1);
        assert_eq!(dto.items[0].quantity, 2);
    }

    #[test]
    fn decode_rejects_malformed_json_as_bad_request() {
        let err = decode::<CreateOrderDto>(b"not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn decode_rejects_schema_violations() {
        let err =
            decode::<CreateOrderDto>(br#"{"items": []}"#).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn error_replies_are_envelopes() {
        let err = AppError::NotFound(anyhow::anyhow!("Order with id 42 not found"));
        let bytes = serde_json::to_vec(&err.envelope()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 404);
        assert!(value["message"].as_str().unwrap().contains("42"));
    }
}
