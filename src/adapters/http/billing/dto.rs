//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! JSON request/response shapes of the billing API. Field names are
//! camelCase on the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::application::billing::{
    CancelResult, ChangeCardResult, SubscribeResult, SubscriptionView, WebhookAck, WebhookOutcome,
};
use crate::domain::billing::{
    BillingKey, LedgerEntry, PaymentStatus, PlanCode, Subscription, SubscriptionState,
};
use crate::domain::foundation::Timestamp;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Gateway payment notification. Missing fields are rejected by the processor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Request to start a subscription after the first payment went through.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub plan: String,
    /// Gateway customer reference the card was registered under.
    pub customer_ref: String,
    /// Gateway reference of the first payment.
    pub payment_ref: String,
    /// Merchant order id of the first payment.
    pub order_id: String,
}

/// Request to move the subscription to a newly registered card.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCardRequest {
    pub customer_ref: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Webhook acknowledgement, also used for webhook errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

impl WebhookResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<WebhookAck> for WebhookResponse {
    fn from(ack: WebhookAck) -> Self {
        Self {
            success: true,
            message: ack.message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub plan: PlanCode,
    pub is_active: bool,
    pub next_billing_date: Timestamp,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(subscription: &Subscription) -> Self {
        Self {
            plan: subscription.plan,
            is_active: subscription.is_active,
            next_billing_date: subscription.next_billing_date,
        }
    }
}

/// Subscription with its lifecycle state and card, for `GET /subscription`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDetailResponse {
    pub plan: PlanCode,
    pub state: SubscriptionState,
    pub is_active: bool,
    pub next_billing_date: Timestamp,
    pub deactivation_date: Option<NaiveDate>,
    pub card_name: String,
    pub card_number: String,
}

impl From<SubscriptionView> for SubscriptionDetailResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            plan: view.plan,
            state: view.state,
            is_active: view.is_active,
            next_billing_date: view.next_billing_date,
            deactivation_date: view.deactivation_date,
            card_name: view.card.card_name,
            card_number: view.card.card_number,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingKeyResponse {
    pub plan: PlanCode,
    pub amount: i64,
    pub subscription_cycle: u32,
    pub is_active: bool,
    pub deactivation_date: Option<NaiveDate>,
}

impl From<&BillingKey> for BillingKeyResponse {
    fn from(key: &BillingKey) -> Self {
        Self {
            plan: key.plan,
            amount: key.amount,
            subscription_cycle: key.subscription_cycle,
            is_active: key.is_active,
            deactivation_date: key.deactivation_date,
        }
    }
}

/// One payment history row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntryResponse {
    pub order_id: String,
    pub payment_ref: Option<String>,
    pub display_name: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub scheduled_at: Option<Timestamp>,
}

impl From<&LedgerEntry> for PaymentEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            order_id: entry.order_id.to_string(),
            payment_ref: entry.payment_ref.clone(),
            display_name: entry.display_name.clone(),
            amount: entry.amount,
            status: entry.status,
            created_at: entry.created_at,
            scheduled_at: entry.scheduled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscription: SubscriptionResponse,
    pub billing_key: BillingKeyResponse,
    pub charge: PaymentEntryResponse,
    pub scheduled: usize,
}

impl From<SubscribeResult> for SubscribeResponse {
    fn from(result: SubscribeResult) -> Self {
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            billing_key: BillingKeyResponse::from(&result.billing_key),
            charge: PaymentEntryResponse::from(&result.charge),
            scheduled: result.schedule.registered,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Service continues until this day.
    pub deactivation_date: NaiveDate,
    pub billing_key: BillingKeyResponse,
}

impl From<CancelResult> for CancelResponse {
    fn from(result: CancelResult) -> Self {
        Self {
            deactivation_date: result.deactivation_date,
            billing_key: BillingKeyResponse::from(&result.billing_key),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCardResponse {
    pub subscription: SubscriptionResponse,
    pub canceled: usize,
    pub error_sync: usize,
    pub scheduled: usize,
}

impl From<ChangeCardResult> for ChangeCardResponse {
    fn from(result: ChangeCardResult) -> Self {
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            canceled: result.outcome.teardown.canceled,
            error_sync: result.outcome.teardown.error_sync,
            scheduled: result.outcome.schedule.registered,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryResponse {
    pub entries: Vec<PaymentEntryResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymizeResponse {
    pub anonymized: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

pub(super) fn outcome_label(outcome: WebhookOutcome) -> &'static str {
    match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::Duplicate => "duplicate",
    }
}
