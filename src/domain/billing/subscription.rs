//! Subscription entity and its lifecycle.
//!
//! The lifecycle state is not stored. It is derived from the subscription
//! row and the billing key:
//!
//! | State | Subscription | Billing key |
//! |-------|--------------|-------------|
//! | None | absent | any |
//! | Active | `is_active` | no `deactivation_date` |
//! | CancelPending | `is_active` | `deactivation_date` set |
//! | Deactivated | `!is_active` | any |

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, SubscriberId, SubscriptionId, Timestamp};

use super::{BillingError, BillingKey, PlanCode};

/// Subscription entity, one per subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: SubscriberId,
    pub plan: PlanCode,
    pub is_active: bool,
    /// Charge time of the earliest open schedule, or a one-period fallback.
    pub next_billing_date: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    pub fn new(subscriber_id: SubscriberId, plan: PlanCode, next_billing_date: Timestamp) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            subscriber_id,
            plan,
            is_active: true,
            next_billing_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Starts a new run on an existing row.
    pub fn reactivate(&mut self, plan: PlanCode, next_billing_date: Timestamp) {
        self.plan = plan;
        self.is_active = true;
        self.next_billing_date = next_billing_date;
        self.updated_at = Timestamp::now();
    }

    pub fn set_next_billing_date(&mut self, next_billing_date: Timestamp) {
        self.next_billing_date = next_billing_date;
        self.updated_at = Timestamp::now();
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Timestamp::now();
    }
}

/// Lifecycle state of a subscriber's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    None,
    Active,
    CancelPending,
    Deactivated,
}

impl SubscriptionState {
    pub fn derive(subscription: Option<&Subscription>, key: Option<&BillingKey>) -> Self {
        match subscription {
            None => SubscriptionState::None,
            Some(sub) if !sub.is_active => SubscriptionState::Deactivated,
            Some(_) if key.map_or(false, BillingKey::is_pending_deactivation) => {
                SubscriptionState::CancelPending
            }
            Some(_) => SubscriptionState::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::None => "NONE",
            SubscriptionState::Active => "ACTIVE",
            SubscriptionState::CancelPending => "CANCEL_PENDING",
            SubscriptionState::Deactivated => "DEACTIVATED",
        }
    }

    /// True while the subscriber still receives service.
    pub fn is_in_service(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Active | SubscriptionState::CancelPending
        )
    }

    /// Validates a lifecycle move, naming both ends on failure.
    pub fn ensure_can_move_to(&self, target: SubscriptionState) -> Result<(), BillingError> {
        self.transition_to(target)
            .map(|_| ())
            .map_err(|_| BillingError::invalid_transition(self.as_str(), target.as_str()))
    }
}

impl StateMachine for SubscriptionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, target),
            (None, Active)
                | (Active, CancelPending)
                | (CancelPending, Active)
                | (CancelPending, Deactivated)
                | (Deactivated, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionState::*;
        match self {
            None => vec![Active],
            Active => vec![CancelPending],
            CancelPending => vec![Active, Deactivated],
            Deactivated => vec![Active],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn subscriber() -> SubscriberId {
        SubscriberId::new("sub-1").unwrap()
    }

    fn subscription() -> Subscription {
        Subscription::new(subscriber(), PlanCode::Basic, Timestamp::now().add_months(1))
    }

    fn key() -> BillingKey {
        BillingKey::new(subscriber(), "customer_sub-1", PlanCode::Basic, 9_900)
    }

    #[test]
    fn no_row_is_none() {
        assert_eq!(SubscriptionState::derive(None, None), SubscriptionState::None);
    }

    #[test]
    fn active_row_without_date_is_active() {
        let sub = subscription();
        let key = key();
        assert_eq!(
            SubscriptionState::derive(Some(&sub), Some(&key)),
            SubscriptionState::Active
        );
    }

    #[test]
    fn pending_date_is_cancel_pending() {
        let sub = subscription();
        let mut key = key();
        key.request_deactivation(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .unwrap();
        assert_eq!(
            SubscriptionState::derive(Some(&sub), Some(&key)),
            SubscriptionState::CancelPending
        );
    }

    #[test]
    fn inactive_row_is_deactivated() {
        let mut sub = subscription();
        sub.deactivate();
        assert_eq!(
            SubscriptionState::derive(Some(&sub), None),
            SubscriptionState::Deactivated
        );
    }

    #[test]
    fn active_cannot_be_deactivated_directly() {
        let err = SubscriptionState::Active
            .ensure_can_move_to(SubscriptionState::Deactivated)
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidTransition { .. }));
    }

    #[test]
    fn deactivated_can_resubscribe() {
        assert!(SubscriptionState::Deactivated.can_transition_to(&SubscriptionState::Active));
        assert!(!SubscriptionState::Deactivated.is_terminal());
    }

    #[test]
    fn in_service_states() {
        assert!(SubscriptionState::Active.is_in_service());
        assert!(SubscriptionState::CancelPending.is_in_service());
        assert!(!SubscriptionState::Deactivated.is_in_service());
        assert!(!SubscriptionState::None.is_in_service());
    }

    #[test]
    fn transitions_consistent() {
        for state in [
            SubscriptionState::None,
            SubscriptionState::Active,
            SubscriptionState::CancelPending,
            SubscriptionState::Deactivated,
        ] {
            for target in state.valid_transitions() {
                assert!(state.can_transition_to(&target));
            }
        }
    }
}
