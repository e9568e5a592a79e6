//! Application startup and lifecycle management.
//!
//! Runs the HTTP health/metrics sidecar next to the bus dispatcher; all
//! business traffic arrives over the message bus.

use crate::config::Config;
use crate::handlers;
use crate::services::metrics::{get_metrics, init_metrics};
use crate::services::orders::OrdersService;
use crate::services::payment_client::NatsPaymentGateway;
use crate::services::pricing::PricingPolicy;
use crate::services::product_client::NatsProductValidator;
use crate::services::repository::PgOrderStore;
use crate::services::Database;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::bus::retry::RetryConfig;
use service_core::bus::BusClient;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "order-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    bus: BusClient,
    service: Arc<OrdersService>,
    db: Database,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let bus = BusClient::connect(
            &config.bus.url,
            &config.service_name,
            config.bus.request_timeout(),
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to NATS: {}", e);
            AppError::UpstreamUnavailable(e.to_string())
        })?;

        let retry = RetryConfig::with_max_retries(config.bus.max_retries);

        let store = Arc::new(PgOrderStore::new(db.pool().clone()));
        let catalog = Arc::new(NatsProductValidator::new(bus.clone(), retry.clone()));
        let payments = Arc::new(NatsPaymentGateway::new(bus.clone(), retry));

        let policy = PricingPolicy {
            client_price_fallback: config.pricing.client_price_fallback,
        };
        if policy.client_price_fallback {
            tracing::warn!(
                "Client-price fallback enabled: caller-supplied prices are used for products the catalog does not return"
            );
        }

        let service = Arc::new(OrdersService::new(store, catalog, payments, policy));

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            "Order service: HTTP on port {}, bus at {}",
            http_port,
            config.bus.url
        );

        Ok(Self {
            http_port,
            http_listener,
            bus,
            service,
            db,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run the application until stopped.
    ///
    /// This starts the HTTP health server and the bus dispatcher
    /// concurrently.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_endpoint));

        let dispatcher = handlers::run(self.bus.inner().clone(), self.service);

        tokio::select! {
            result = axum::serve(self.http_listener, http_router) => {
                if let Err(e) = result {
                    tracing::error!("HTTP server error: {}", e);
                    return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                }
            }
            result = dispatcher => {
                if let Err(e) = result {
                    tracing::error!("Dispatcher error: {}", e);
                    return Err(std::io::Error::other(format!("Dispatcher error: {}", e)));
                }
            }
        }

        Ok(())
    }
}
