//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresBillingStore` - transactional billing store with per-subscriber
//!   advisory locks

mod billing_store;

pub use billing_store::PostgresBillingStore;
