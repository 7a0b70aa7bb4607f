//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    anonymize_history, cancel, card_info, change_card, get_subscription, handle_payment_webhook,
    payment_history, restore, subscribe, BillingAppState,
};

/// Subscriber-facing billing routes.
///
/// # Routes (require `X-Subscriber-Id`)
/// - `POST /subscribe` - Start a subscription after the first payment
/// - `POST /cancel` - Cancel at the end of the paid period
/// - `POST /restore` - Withdraw a pending cancellation
/// - `POST /change-card` - Move schedules to a new card
/// - `GET /subscription` - Plan, state, billing dates and card (404 if none)
/// - `GET /payment-history` - Payment history, newest first
/// - `DELETE /payment-history` - Anonymize history of a deactivated subscription
/// - `GET /card-info` - Masked card of the active billing key
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/cancel", post(cancel))
        .route("/restore", post(restore))
        .route("/change-card", post(change_card))
        .route("/subscription", get(get_subscription))
        .route(
            "/payment-history",
            get(payment_history).delete(anonymize_history),
        )
        .route("/card-info", get(card_info))
}

/// Gateway webhook route. No subscriber identity; every payment is
/// re-verified with the gateway instead.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/payment-webhook", post(handle_payment_webhook))
}

/// Billing routes mounted at `/api/billing` plus the webhook at the root.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/billing", billing_routes())
        .merge(webhook_routes())
}
