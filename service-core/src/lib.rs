//! service-core: Shared infrastructure for micros microservices.
pub mod bus;
pub mod error;
pub mod observability;
