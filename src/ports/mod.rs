//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentGateway` - Remote payment gateway (tokens, verification, schedules, cards)
//! - `BillingStore` / `BillingUnitOfWork` - Per-subscriber transactional storage
//! - `SubscriberDirectory` - Subscriber contact details owned elsewhere

mod billing_store;
mod payment_gateway;
mod subscriber_directory;

pub use billing_store::{BillingStore, BillingUnitOfWork};
pub use payment_gateway::{
    AccessToken, BuyerContact, CardInfo, GatewayError, GatewayErrorCode, GatewayRejection,
    GatewayResult, PaymentGateway, PaymentRecord, RemotePaymentStatus, ScheduleRequest,
    ScheduledCharge,
};
pub use subscriber_directory::SubscriberDirectory;
