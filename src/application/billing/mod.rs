//! Billing use cases.
//!
//! # Components
//!
//! - `Ledger` - payment history operations inside a unit of work
//! - `ScheduleReconciler` - registers future charges and mirrors confirmed ones
//! - `BillingKeyManager` - key upsert, card change, deferred deactivation
//! - `SubscriptionManager` - subscribe, cancel, restore, change card, anonymize
//! - `WebhookProcessor` - verified, idempotent charge notifications
//! - `DeactivationSweeper` - daily finalization of due cancellations
//! - Queries - subscription, payment history and card info

mod billing_key_manager;
mod deactivation_sweeper;
mod ledger;
mod policy;
mod queries;
mod schedule_reconciler;
mod services;
mod subscription_manager;
mod webhook_processor;

pub use billing_key_manager::{BillingKeyManager, CardChangeOutcome, ScheduleTeardown};
pub use deactivation_sweeper::{DeactivationSweeper, SweepFailure, SweepReport};
pub use ledger::Ledger;
pub use policy::BillingPolicy;
pub use queries::{
    CardInfoView, GetCardInfoHandler, GetPaymentHistoryHandler, GetSubscriptionHandler,
    SubscriptionView,
};
pub use schedule_reconciler::{ReconcileOutcome, ScheduleReconciler};
pub use services::BillingServices;
pub use subscription_manager::{
    CancelResult, ChangeCardCommand, ChangeCardResult, SubscribeCommand, SubscribeResult,
    SubscriptionManager,
};
pub use webhook_processor::{WebhookAck, WebhookCommand, WebhookOutcome, WebhookProcessor};
