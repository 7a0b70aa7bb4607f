//! Payment gateway port.
//!
//! The narrow slice of the remote gateway the billing core depends on:
//! access tokens, payment lookup, schedule registration and cancellation,
//! and the card registered for a customer reference.
//!
//! # Design
//!
//! - **No retries**: every call is a single network round trip. Retry policy
//!   belongs to callers.
//! - **Explicit token**: callers fetch one token per use case and pass it to
//!   each call.
//! - **Failures are values**: a gateway that answers but rejects a batch
//!   returns `Ok(GatewayResult { success: false, .. })` with a
//!   [`GatewayRejection`] saying why. Transport and protocol failures are
//!   `Err(GatewayError)`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, OrderId, PaymentStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// Port for the remote payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchanges the configured credentials for a bearer token.
    ///
    /// Fails with an authentication error when the gateway refuses them.
    async fn fetch_access_token(&self) -> Result<AccessToken, GatewayError>;

    /// Looks up a payment. `Ok(None)` when the gateway does not know it.
    async fn verify_payment(
        &self,
        payment_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<PaymentRecord>, GatewayError>;

    /// Registers a batch of future charges against a customer reference.
    async fn register_schedules(
        &self,
        customer_ref: &str,
        requests: &[ScheduleRequest],
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError>;

    /// Withdraws every pending schedule of a customer reference.
    ///
    /// `entries` echoes the schedules the gateway actually withdrew.
    async fn cancel_schedules(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError>;

    /// Card registered for a customer reference. `Ok(None)` when unknown.
    async fn fetch_customer_card(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<CardInfo>, GatewayError>;
}

/// Short-lived bearer token. Never logged.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePaymentStatus {
    Ready,
    Paid,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl RemotePaymentStatus {
    /// True when the gateway's view agrees with a local ledger status.
    pub fn confirms(&self, local: PaymentStatus) -> bool {
        matches!(
            (self, local),
            (RemotePaymentStatus::Paid, PaymentStatus::Paid)
                | (RemotePaymentStatus::Failed, PaymentStatus::Failed)
                | (RemotePaymentStatus::Cancelled, PaymentStatus::Canceled)
        )
    }
}

/// A payment as the gateway records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_ref: String,
    pub order_id: String,
    pub amount: i64,
    pub status: RemotePaymentStatus,
    pub customer_ref: Option<String>,
    pub paid_at: Option<Timestamp>,
}

/// Buyer details attached to a scheduled charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerContact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// One future charge to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub order_id: OrderId,
    pub charge_at: Timestamp,
    pub amount: i64,
    pub display_name: String,
    pub buyer: BuyerContact,
}

/// A schedule the gateway confirmed (or withdrew).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCharge {
    pub order_id: OrderId,
    pub charge_at: Timestamp,
}

/// Outcome of a schedule batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResult {
    pub success: bool,
    pub entries: Vec<ScheduledCharge>,
    /// Gateway message, present on rejection.
    pub message: Option<String>,
    /// Why the call was refused. `None` on success.
    pub rejection: Option<GatewayRejection>,
}

/// Reason a schedule call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRejection {
    /// The customer reference holds no pending schedules.
    NothingScheduled,
    /// Any other refusal (merchant, card, authorization, ...).
    Refused,
}

impl GatewayResult {
    pub fn confirmed(entries: Vec<ScheduledCharge>) -> Self {
        Self {
            success: true,
            entries,
            message: None,
            rejection: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::refused_with(GatewayRejection::Refused, message)
    }

    pub fn nothing_scheduled(message: impl Into<String>) -> Self {
        Self::refused_with(GatewayRejection::NothingScheduled, message)
    }

    fn refused_with(rejection: GatewayRejection, message: impl Into<String>) -> Self {
        Self {
            success: false,
            entries: Vec::new(),
            message: Some(message.into()),
            rejection: Some(rejection),
        }
    }

    pub fn is_nothing_scheduled(&self) -> bool {
        self.rejection == Some(GatewayRejection::NothingScheduled)
    }
}

/// Card registered with the gateway. Numbers arrive already partly masked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub card_name: Option<String>,
    pub card_number: Option<String>,
}

/// Errors from gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// Gateway's own error code (if available).
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Authentication, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::MalformedResponse, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::Authentication => BillingError::Auth(err.message),
            _ => BillingError::gateway(err.to_string(), err.retryable),
        }
    }
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        DomainError::new(ErrorCode::ExternalServiceError, err.to_string())
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Connection failed before a response arrived.
    Network,
    /// No response within the configured timeout.
    Timeout,
    /// Credentials or token refused.
    Authentication,
    /// Too many requests.
    RateLimited,
    /// Gateway rejected the request as invalid.
    InvalidRequest,
    /// Response body did not have the expected shape.
    MalformedResponse,
    /// Any other non-success answer.
    ProviderError,
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Network | GatewayErrorCode::Timeout | GatewayErrorCode::RateLimited
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Network => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::Authentication => "authentication_error",
            GatewayErrorCode::RateLimited => "rate_limited",
            GatewayErrorCode::InvalidRequest => "invalid_request",
            GatewayErrorCode::MalformedResponse => "malformed_response",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn transient_codes_are_retryable() {
        assert!(GatewayErrorCode::Timeout.is_retryable());
        assert!(GatewayErrorCode::Network.is_retryable());
        assert!(GatewayErrorCode::RateLimited.is_retryable());
        assert!(!GatewayErrorCode::Authentication.is_retryable());
        assert!(!GatewayErrorCode::MalformedResponse.is_retryable());
    }

    #[test]
    fn authentication_maps_to_auth_billing_error() {
        let err: BillingError = GatewayError::authentication("invalid imp_key").into();
        assert!(matches!(err, BillingError::Auth(_)));
    }

    #[test]
    fn timeout_maps_to_retryable_gateway_error() {
        let err: BillingError = GatewayError::timeout("10s elapsed").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-token");
        assert!(!format!("{:?}", token).contains("secret-token"));
        assert_eq!(token.expose(), "secret-token");
    }

    #[test]
    fn remote_status_confirms_matching_local_status() {
        assert!(RemotePaymentStatus::Paid.confirms(PaymentStatus::Paid));
        assert!(RemotePaymentStatus::Cancelled.confirms(PaymentStatus::Canceled));
        assert!(!RemotePaymentStatus::Ready.confirms(PaymentStatus::Paid));
        assert!(!RemotePaymentStatus::Paid.confirms(PaymentStatus::Failed));
    }

    #[test]
    fn unknown_remote_status_deserializes() {
        let status: RemotePaymentStatus = serde_json::from_str("\"partial_cancelled\"").unwrap();
        assert_eq!(status, RemotePaymentStatus::Unknown);
    }
}
