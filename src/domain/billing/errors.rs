//! Billing-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation, UnknownPlan | 400 |
//! | VerificationFailed | 400 |
//! | NotSubscribed, NoActiveBillingKey, UnknownOrder | 404 |
//! | AlreadySubscribed, AlreadyCanceled, NothingPending, NothingToRestore | 409 |
//! | InvalidTransition, SubscriptionStillActive, DuplicateOrderId | 409 |
//! | Gateway, ScheduleRegistrationFailed, Auth | 502 |
//! | Infrastructure | 500 |
//!
//! The webhook endpoint narrows this: every client-side rejection there is a 400.

use crate::domain::foundation::{DomainError, ErrorCode, SubscriberId, ValidationError};

/// Errors surfaced by billing use cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// A required field is missing or malformed.
    Validation { field: String, message: String },

    /// Plan code not in the price table.
    UnknownPlan(String),

    /// Subscriber already has an active subscription.
    AlreadySubscribed(SubscriberId),

    /// Cancellation already requested or subscription already deactivated.
    AlreadyCanceled(SubscriberId),

    /// Restore requested but no cancellation is pending.
    NothingPending(SubscriberId),

    /// Billing key has no deactivation date to clear.
    NothingToRestore(SubscriberId),

    /// Subscriber has no subscription.
    NotSubscribed(SubscriberId),

    /// Subscriber has no active billing key.
    NoActiveBillingKey(SubscriberId),

    /// Status change not allowed from the current state.
    InvalidTransition { current: String, attempted: String },

    /// History can't be anonymized while service is still running.
    SubscriptionStillActive(SubscriberId),

    /// Order id already present in the ledger.
    DuplicateOrderId(String),

    /// No ledger entry carries this order id.
    UnknownOrder(String),

    /// Gateway call failed (timeout, non-2xx, malformed response).
    Gateway { message: String, retryable: bool },

    /// Gateway rejected the schedule batch as a whole.
    ScheduleRegistrationFailed { reason: String },

    /// Gateway could not confirm a payment or card.
    VerificationFailed { reference: String, reason: String },

    /// Gateway credentials were refused.
    Auth(String),

    /// Storage or other unexpected failure.
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_plan(plan: impl Into<String>) -> Self {
        BillingError::UnknownPlan(plan.into())
    }

    pub fn invalid_transition(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidTransition {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        BillingError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn schedule_registration_failed(reason: impl Into<String>) -> Self {
        BillingError::ScheduleRegistrationFailed {
            reason: reason.into(),
        }
    }

    pub fn verification_failed(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        BillingError::VerificationFailed {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. } => ErrorCode::ValidationFailed,
            BillingError::UnknownPlan(_) => ErrorCode::UnknownPlan,
            BillingError::AlreadySubscribed(_) => ErrorCode::AlreadySubscribed,
            BillingError::AlreadyCanceled(_) => ErrorCode::AlreadyCanceled,
            BillingError::NothingPending(_) => ErrorCode::NothingPending,
            BillingError::NothingToRestore(_) => ErrorCode::NothingToRestore,
            BillingError::NotSubscribed(_) => ErrorCode::SubscriptionNotFound,
            BillingError::NoActiveBillingKey(_) => ErrorCode::BillingKeyNotFound,
            BillingError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            BillingError::SubscriptionStillActive(_) => ErrorCode::SubscriptionStillActive,
            BillingError::DuplicateOrderId(_) => ErrorCode::DuplicateOrderId,
            BillingError::UnknownOrder(_) => ErrorCode::LedgerEntryNotFound,
            BillingError::Gateway { .. } | BillingError::Auth(_) => {
                ErrorCode::ExternalServiceError
            }
            BillingError::ScheduleRegistrationFailed { .. } => {
                ErrorCode::ScheduleRegistrationFailed
            }
            BillingError::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            BillingError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::UnknownPlan(plan) => format!("Unknown plan: {}", plan),
            BillingError::AlreadySubscribed(id) => {
                format!("Subscriber {} already has an active subscription", id)
            }
            BillingError::AlreadyCanceled(id) => {
                format!("Subscription for {} is already canceled", id)
            }
            BillingError::NothingPending(id) => {
                format!("No pending cancellation for subscriber {}", id)
            }
            BillingError::NothingToRestore(id) => {
                format!("Billing key for {} has no scheduled deactivation", id)
            }
            BillingError::NotSubscribed(id) => format!("No subscription found for {}", id),
            BillingError::NoActiveBillingKey(id) => {
                format!("No active billing key for subscriber {}", id)
            }
            BillingError::InvalidTransition { current, attempted } => {
                format!("Cannot move from {} to {}", current, attempted)
            }
            BillingError::SubscriptionStillActive(id) => {
                format!("Subscription for {} must be deactivated first", id)
            }
            BillingError::DuplicateOrderId(order_id) => {
                format!("Order id {} already recorded", order_id)
            }
            BillingError::UnknownOrder(order_id) => format!("Unknown order: {}", order_id),
            BillingError::Gateway { message, .. } => format!("Payment gateway error: {}", message),
            BillingError::ScheduleRegistrationFailed { reason } => {
                format!("Schedule registration failed: {}", reason)
            }
            BillingError::VerificationFailed { reference, reason } => {
                format!("Could not verify {}: {}", reference, reason)
            }
            BillingError::Auth(msg) => format!("Payment gateway authentication failed: {}", msg),
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the whole operation may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Gateway { retryable, .. } => *retryable,
            BillingError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::DuplicateOrderId => BillingError::DuplicateOrderId(
                err.details
                    .get("order_id")
                    .cloned()
                    .unwrap_or_else(|| err.message.clone()),
            ),
            ErrorCode::ValidationFailed => BillingError::Validation {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::InvalidStateTransition => BillingError::InvalidTransition {
                current: "unknown".to_string(),
                attempted: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
