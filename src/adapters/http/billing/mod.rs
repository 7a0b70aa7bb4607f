//! HTTP adapter for billing endpoints.
//!
//! - `POST /payment-webhook` - Gateway payment notification
//! - `POST /api/billing/subscribe` - Start a subscription
//! - `POST /api/billing/cancel` - Deferred cancellation
//! - `POST /api/billing/restore` - Undo a pending cancellation
//! - `POST /api/billing/change-card` - Replace the card behind the billing key
//! - `GET|DELETE /api/billing/payment-history` - History and anonymization
//! - `GET /api/billing/card-info` - Masked card info

pub mod dto;
mod handlers;
mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState, SubscriberIdentity, SUBSCRIBER_HEADER};
pub use routes::{billing_router, billing_routes, webhook_routes};
