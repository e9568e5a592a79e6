//! Message-bus plumbing shared by the micros services.
//!
//! Wraps the NATS client with JSON encoding, per-request timeouts, and
//! error classification; `retry` adds bounded retry with backoff on top.

pub mod retry;

use async_nats::RequestErrorKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by bus requests, classified for retry decisions.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to NATS at {url}: {detail}")]
    Connect { url: String, detail: String },

    #[error("request on {subject} timed out after {elapsed:?}")]
    Timeout { subject: String, elapsed: Duration },

    #[error("no responders for {0}")]
    NoResponders(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode reply on {subject}: {detail}")]
    Decode { subject: String, detail: String },

    #[error("upstream replied with error {status}: {message}")]
    Upstream { status: u16, message: String },
}

/// JSON request/reply client over NATS.
#[derive(Clone)]
pub struct BusClient {
    client: async_nats::Client,
    request_timeout: Duration,
}

impl BusClient {
    pub async fn connect(
        url: &str,
        connection_name: &str,
        request_timeout: Duration,
    ) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name(connection_name)
            .connect(url)
            .await
            .map_err(|e| BusError::Connect {
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// The underlying NATS client, for subscriptions and raw replies.
    pub fn inner(&self) -> &async_nats::Client {
        &self.client
    }

    /// Send a JSON request and decode the JSON reply.
    ///
    /// A reply carrying the `{status, message}` error envelope is
    /// surfaced as [`BusError::Upstream`].
    pub async fn request_json<P, R>(&self, subject: &str, payload: &P) -> Result<R, BusError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let bytes = serde_json::to_vec(payload).map_err(|e| BusError::Encode(e.to_string()))?;

        debug!(subject = subject, "bus request");

        let request = self.client.request(subject.to_string(), bytes.into());
        let message = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(message)) => message,
            Ok(Err(err)) => {
                return Err(match err.kind() {
                    RequestErrorKind::TimedOut => BusError::Timeout {
                        subject: subject.to_string(),
                        elapsed: self.request_timeout,
                    },
                    RequestErrorKind::NoResponders => BusError::NoResponders(subject.to_string()),
                    RequestErrorKind::Other => BusError::Request(err.to_string()),
                })
            }
            Err(_) => {
                return Err(BusError::Timeout {
                    subject: subject.to_string(),
                    elapsed: self.request_timeout,
                })
            }
        };

        decode_reply(subject, &message.payload)
    }
}

/// Strict probe for an error-envelope reply. `deny_unknown_fields` keeps
/// payloads that merely happen to carry `status`/`message` fields from
/// being mistaken for errors.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorProbe {
    status: u16,
    message: String,
}

/// Classify a reply payload: error envelope, expected shape, or garbage.
fn decode_reply<R: DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<R, BusError> {
    if let Ok(envelope) = serde_json::from_slice::<ErrorProbe>(payload) {
        return Err(BusError::Upstream {
            status: envelope.status,
            message: envelope.message,
        });
    }

    serde_json::from_slice::<R>(payload).map_err(|e| BusError::Decode {
        subject: subject.to_string(),
        detail: e.to_string(),
    })
}
