//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing use cases.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::billing::{
    BillingServices, ChangeCardCommand, SubscribeCommand, WebhookCommand,
};
use crate::domain::billing::{BillingError, PlanCode};
use crate::domain::foundation::SubscriberId;

use super::dto::{
    outcome_label, AnonymizeResponse, BillingKeyResponse, CancelResponse, ChangeCardRequest,
    ChangeCardResponse, ErrorResponse, PaymentEntryResponse, PaymentHistoryResponse,
    SubscribeRequest, SubscribeResponse, SubscriptionDetailResponse, WebhookRequest,
    WebhookResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state of the billing routes.
#[derive(Clone)]
pub struct BillingAppState {
    pub services: BillingServices,
}

impl BillingAppState {
    pub fn new(services: BillingServices) -> Self {
        Self { services }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriber identity (authentication lives upstream)
// ════════════════════════════════════════════════════════════════════════════════

pub const SUBSCRIBER_HEADER: &str = "X-Subscriber-Id";

/// Subscriber the request acts for, taken from the `X-Subscriber-Id` header
/// set by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct SubscriberIdentity {
    pub subscriber_id: SubscriberId,
}

/// Rejection type for SubscriberIdentity extraction.
pub struct IdentityRequired;

impl IntoResponse for IdentityRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Subscriber identity is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for SubscriberIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let subscriber_id = parts
            .headers
            .get(SUBSCRIBER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| SubscriberId::new(s.trim()).ok())
            .ok_or(IdentityRequired)?;

        Ok(SubscriberIdentity { subscriber_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /payment-webhook - Gateway payment notification
///
/// Always answers `{success, message}`. Client-side problems (missing
/// fields, unknown order, failed verification) are 400; anything else is 500
/// so the gateway redelivers.
pub async fn handle_payment_webhook(
    State(state): State<BillingAppState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> (StatusCode, Json<WebhookResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Unreadable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::failure("Invalid webhook payload")),
            );
        }
    };

    let cmd = WebhookCommand {
        payment_ref: request.payment_ref.unwrap_or_default(),
        order_id: request.order_id.unwrap_or_default(),
        status: request.status.unwrap_or_default(),
    };

    match state.services.webhooks.handle(cmd).await {
        Ok(ack) => {
            tracing::debug!(
                order_id = %ack.order_id,
                outcome = outcome_label(ack.outcome),
                "Webhook acknowledged"
            );
            (StatusCode::OK, Json(WebhookResponse::from(ack)))
        }
        Err(err) if is_webhook_rejection(&err) => {
            tracing::warn!(error = %err, "Webhook rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::failure(err.message())),
            )
        }
        Err(err) => {
            tracing::error!(error = %err, retryable = err.is_retryable(), "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::failure("Internal error")),
            )
        }
    }
}

fn is_webhook_rejection(err: &BillingError) -> bool {
    matches!(
        err,
        BillingError::Validation { .. }
            | BillingError::UnknownOrder(_)
            | BillingError::VerificationFailed { .. }
            | BillingError::InvalidTransition { .. }
            | BillingError::DuplicateOrderId(_)
    )
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/subscribe - Start a subscription
pub async fn subscribe(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
    Json(request): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = SubscribeCommand {
        subscriber_id: identity.subscriber_id,
        plan: request.plan.parse::<PlanCode>()?,
        customer_ref: request.customer_ref,
        payment_ref: request.payment_ref,
        order_id: request.order_id,
    };

    let result = state.services.subscriptions.subscribe(cmd).await?;

    Ok((StatusCode::CREATED, Json(SubscribeResponse::from(result))))
}

/// POST /api/billing/cancel - Request cancellation at the end of the paid period
pub async fn cancel(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .services
        .subscriptions
        .cancel(&identity.subscriber_id)
        .await?;

    Ok(Json(CancelResponse::from(result)))
}

/// POST /api/billing/restore - Withdraw a pending cancellation
pub async fn restore(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let key = state
        .services
        .subscriptions
        .restore(&identity.subscriber_id)
        .await?;

    Ok(Json(BillingKeyResponse::from(&key)))
}

/// POST /api/billing/change-card - Move schedules to a new card
pub async fn change_card(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
    Json(request): Json<ChangeCardRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ChangeCardCommand {
        subscriber_id: identity.subscriber_id,
        customer_ref: request.customer_ref,
    };

    let result = state.services.subscriptions.change_card(cmd).await?;

    Ok(Json(ChangeCardResponse::from(result)))
}

/// DELETE /api/billing/payment-history - Anonymize history after deactivation
pub async fn anonymize_history(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let anonymized = state
        .services
        .subscriptions
        .anonymize_history(&identity.subscriber_id)
        .await?;

    Ok(Json(AnonymizeResponse { anonymized }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/subscription - Plan, lifecycle state, billing dates and card
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .services
        .subscription
        .handle(&identity.subscriber_id)
        .await?;

    Ok(Json(SubscriptionDetailResponse::from(view)))
}

/// GET /api/billing/payment-history - Ledger rows, newest first
pub async fn payment_history(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let entries = state
        .services
        .payment_history
        .handle(&identity.subscriber_id)
        .await?;

    Ok(Json(PaymentHistoryResponse {
        entries: entries.iter().map(PaymentEntryResponse::from).collect(),
    }))
}

/// GET /api/billing/card-info - Masked card behind the active key
pub async fn card_info(
    State(state): State<BillingAppState>,
    identity: SubscriberIdentity,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .services
        .card_info
        .handle(&identity.subscriber_id)
        .await?;

    Ok(Json(view))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation { .. } | BillingError::UnknownPlan(_) => {
                StatusCode::BAD_REQUEST
            }
            BillingError::NotSubscribed(_)
            | BillingError::NoActiveBillingKey(_)
            | BillingError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            BillingError::AlreadySubscribed(_)
            | BillingError::AlreadyCanceled(_)
            | BillingError::NothingPending(_)
            | BillingError::NothingToRestore(_)
            | BillingError::InvalidTransition { .. }
            | BillingError::SubscriptionStillActive(_)
            | BillingError::DuplicateOrderId(_) => StatusCode::CONFLICT,
            BillingError::VerificationFailed { .. } => StatusCode::PAYMENT_REQUIRED,
            BillingError::Gateway {
                retryable: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::Gateway { .. }
            | BillingError::ScheduleRegistrationFailed { .. }
            | BillingError::Auth(_) => StatusCode::BAD_GATEWAY,
            BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Billing request failed");
            "Internal error".to_string()
        } else {
            self.0.message()
        };
        let body = ErrorResponse::new(self.0.code().to_string(), message);
        (status, Json(body)).into_response()
    }
}
