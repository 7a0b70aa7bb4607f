//! Billing key entity.
//!
//! A billing key is the local record of a subscriber's payment credential
//! registered with the gateway (the gateway "customer" reference).
//!
//! # Design Decisions
//!
//! - **One row per subscriber**: re-subscribing or changing card overwrites the
//!   row in place, so ledger rows keep pointing at it.
//! - **Deferred deactivation**: cancelling only records `deactivation_date`;
//!   the daily sweep flips `is_active`.
//! - **Money in KRW**: `amount` is an integer won value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BillingKeyId, SubscriberId, Timestamp};

use super::{BillingError, PlanCode};

/// Billing key entity.
///
/// # Invariants
///
/// - `deactivation_date` is only set while `is_active` is true
/// - `subscription_cycle` starts at 1 and only increases while the key is in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingKey {
    pub id: BillingKeyId,
    pub subscriber_id: SubscriberId,

    /// Gateway customer reference the schedules are registered against.
    pub customer_ref: String,

    pub plan: PlanCode,
    pub amount: i64,

    /// Number of successful charges in the current run of the subscription.
    pub subscription_cycle: u32,

    pub is_active: bool,

    /// Day on which the sweep finalizes a requested cancellation.
    pub deactivation_date: Option<NaiveDate>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BillingKey {
    /// Creates the key for a subscriber's first registered card.
    pub fn new(
        subscriber_id: SubscriberId,
        customer_ref: impl Into<String>,
        plan: PlanCode,
        amount: i64,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: BillingKeyId::new(),
            subscriber_id,
            customer_ref: customer_ref.into(),
            plan,
            amount,
            subscription_cycle: 1,
            is_active: true,
            deactivation_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites credential, plan and amount for a new subscription run.
    /// Reactivates the key and restarts the cycle counter.
    pub fn overwrite(&mut self, customer_ref: impl Into<String>, plan: PlanCode, amount: i64) {
        self.customer_ref = customer_ref.into();
        self.plan = plan;
        self.amount = amount;
        self.subscription_cycle = 1;
        self.is_active = true;
        self.deactivation_date = None;
        self.updated_at = Timestamp::now();
    }

    /// Swaps the gateway customer reference, returning the previous one.
    pub fn swap_customer_ref(&mut self, customer_ref: impl Into<String>) -> String {
        self.updated_at = Timestamp::now();
        std::mem::replace(&mut self.customer_ref, customer_ref.into())
    }

    pub fn is_pending_deactivation(&self) -> bool {
        self.is_active && self.deactivation_date.is_some()
    }

    /// True when the sweep should finalize this key on `today`.
    pub fn is_due_for_deactivation(&self, today: NaiveDate) -> bool {
        self.is_active && self.deactivation_date.map_or(false, |date| date <= today)
    }

    /// Records a deferred cancellation.
    pub fn request_deactivation(&mut self, effective: NaiveDate) -> Result<(), BillingError> {
        if !self.is_active || self.deactivation_date.is_some() {
            return Err(BillingError::AlreadyCanceled(self.subscriber_id.clone()));
        }
        self.deactivation_date = Some(effective);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Clears a pending deactivation.
    pub fn restore(&mut self) -> Result<(), BillingError> {
        if self.deactivation_date.take().is_none() {
            return Err(BillingError::NothingToRestore(self.subscriber_id.clone()));
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the key inactive. The pending date goes with it.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.deactivation_date = None;
        self.updated_at = Timestamp::now();
    }

    pub fn record_successful_charge(&mut self) {
        self.subscription_cycle += 1;
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BillingKey {
        BillingKey::new(
            SubscriberId::new("sub-1").unwrap(),
            "customer_sub-1",
            PlanCode::Basic,
            9_900,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_key_is_active_on_first_cycle() {
        let key = key();
        assert!(key.is_active);
        assert_eq!(key.subscription_cycle, 1);
        assert!(key.deactivation_date.is_none());
    }

    #[test]
    fn request_deactivation_keeps_key_active() {
        let mut key = key();
        key.request_deactivation(date(2024, 3, 1)).unwrap();
        assert!(key.is_active);
        assert!(key.is_pending_deactivation());
    }

    #[test]
    fn second_deactivation_request_is_rejected() {
        let mut key = key();
        key.request_deactivation(date(2024, 3, 1)).unwrap();
        let err = key.request_deactivation(date(2024, 4, 1)).unwrap_err();
        assert!(matches!(err, BillingError::AlreadyCanceled(_)));
        assert_eq!(key.deactivation_date, Some(date(2024, 3, 1)));
    }

    #[test]
    fn restore_without_pending_date_fails() {
        let mut key = key();
        assert!(matches!(key.restore(), Err(BillingError::NothingToRestore(_))));
    }

    #[test]
    fn restore_clears_pending_date() {
        let mut key = key();
        key.request_deactivation(date(2024, 3, 1)).unwrap();
        key.restore().unwrap();
        assert!(key.deactivation_date.is_none());
        assert!(key.is_active);
    }

    #[test]
    fn due_only_on_or_after_date() {
        let mut key = key();
        key.request_deactivation(date(2024, 3, 1)).unwrap();
        assert!(!key.is_due_for_deactivation(date(2024, 2, 29)));
        assert!(key.is_due_for_deactivation(date(2024, 3, 1)));
        assert!(key.is_due_for_deactivation(date(2024, 3, 2)));
    }

    #[test]
    fn deactivate_clears_date() {
        let mut key = key();
        key.request_deactivation(date(2024, 3, 1)).unwrap();
        key.deactivate();
        assert!(!key.is_active);
        assert!(key.deactivation_date.is_none());
        assert!(!key.is_due_for_deactivation(date(2024, 3, 1)));
    }

    #[test]
    fn overwrite_keeps_id_and_reactivates() {
        let mut key = key();
        let id = key.id;
        key.record_successful_charge();
        key.deactivate();

        key.overwrite("customer_new", PlanCode::Enterprise, 29_900);

        assert_eq!(key.id, id);
        assert!(key.is_active);
        assert_eq!(key.customer_ref, "customer_new");
        assert_eq!(key.subscription_cycle, 1);
    }

    #[test]
    fn swap_returns_previous_reference() {
        let mut key = key();
        let old = key.swap_customer_ref("customer_other");
        assert_eq!(old, "customer_sub-1");
        assert_eq!(key.customer_ref, "customer_other");
    }
}
