//! In-memory adapters for tests and single-process development.

mod billing_store;
mod subscriber_directory;

pub use billing_store::InMemoryBillingStore;
pub use subscriber_directory::InMemorySubscriberDirectory;
