//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `portone` - PortOne payment gateway (REST) and a scriptable mock
//! - `postgres` - PostgreSQL billing store
//! - `memory` - In-memory billing store and subscriber directory
//! - `http` - Axum REST API

pub mod http;
pub mod memory;
pub mod portone;
pub mod postgres;

pub use memory::{InMemoryBillingStore, InMemorySubscriberDirectory};
pub use portone::{MockPaymentGateway, PortOneConfig, PortOneGateway};
pub use postgres::PostgresBillingStore;
