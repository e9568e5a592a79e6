use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub pricing: PricingConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BusConfig {
    pub url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

impl BusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct PricingConfig {
    /// Use the caller-supplied price when the catalog omits a product.
    pub client_price_fallback: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("ORDERS_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ORDERS_SERVICE_PORT")
            .unwrap_or_else(|_| "3004".to_string())
            .parse()?;

        let db_url = env::var("ORDERS_DATABASE_URL").expect("ORDERS_DATABASE_URL must be set");
        let max_connections = env::var("ORDERS_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("ORDERS_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let nats_url =
            env::var("ORDERS_NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
        let request_timeout_ms = env::var("ORDERS_BUS_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()?;
        let max_retries = env::var("ORDERS_BUS_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?;

        let client_price_fallback = env::var("ORDERS_CLIENT_PRICE_FALLBACK")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            bus: BusConfig {
                url: nats_url,
                request_timeout_ms,
                max_retries,
            },
            pricing: PricingConfig {
                client_price_fallback,
            },
            service_name: "order-service".to_string(),
        })
    }
}
