//! PortOne payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for the PortOne (iamport) REST API:
//! - Access tokens from API credentials
//! - Payment verification
//! - Recurring charge schedules per customer reference
//! - Registered card lookup
//!
//! # Configuration
//!
//! Credentials come from `AppConfig.gateway`, never from ambient state:
//! - `imp_key` / `imp_secret`: REST API credentials
//! - `api_base_url`: defaults to `https://api.iamport.kr`
//! - `request_timeout_secs`: per-request timeout

mod mock_gateway;
mod portone_adapter;

pub use mock_gateway::{MethodCall, MockPaymentGateway};
pub use portone_adapter::{PortOneConfig, PortOneGateway};
