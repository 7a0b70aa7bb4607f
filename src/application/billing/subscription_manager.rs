//! SubscriptionManager - subscriber-facing lifecycle commands.
//!
//! ```text
//! NONE ──subscribe──► ACTIVE ──cancel──► CANCEL_PENDING ──sweep──► DEACTIVATED
//!                       ▲                     │                        │
//!                       └──────restore────────┘                        │
//!                       └──────────────────subscribe───────────────────┘
//! ```
//!
//! Every command runs in one unit of work for the subscriber and commits
//! only at the end. Gateway tokens are fetched before the unit of work opens.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::billing::{
    BillingError, BillingKey, LedgerEntry, OrderId, PlanCode, Subscription, SubscriptionState,
};
use crate::domain::foundation::{SubscriberId, Timestamp};
use crate::ports::{
    AccessToken, BillingStore, BillingUnitOfWork, PaymentGateway, RemotePaymentStatus,
};

use super::{
    BillingKeyManager, BillingPolicy, CardChangeOutcome, Ledger, ReconcileOutcome,
    ScheduleReconciler,
};

/// Command to start (or restart) a subscription after an immediate payment.
#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub subscriber_id: SubscriberId,
    pub plan: PlanCode,
    /// Gateway customer reference the card was issued under.
    pub customer_ref: String,
    /// Proof of the first payment.
    pub payment_ref: String,
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct SubscribeResult {
    pub subscription: Subscription,
    pub billing_key: BillingKey,
    pub charge: LedgerEntry,
    pub schedule: ReconcileOutcome,
}

#[derive(Debug, Clone)]
pub struct CancelResult {
    pub billing_key: BillingKey,
    /// Service continues until this date.
    pub deactivation_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ChangeCardCommand {
    pub subscriber_id: SubscriberId,
    pub customer_ref: String,
}

#[derive(Debug, Clone)]
pub struct ChangeCardResult {
    pub subscription: Subscription,
    pub outcome: CardChangeOutcome,
}

pub struct SubscriptionManager {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    keys: Arc<BillingKeyManager>,
    reconciler: Arc<ScheduleReconciler>,
    ledger: Ledger,
    policy: BillingPolicy,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        keys: Arc<BillingKeyManager>,
        reconciler: Arc<ScheduleReconciler>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            keys,
            reconciler,
            ledger: Ledger::new(),
            policy,
        }
    }

    /// NONE/DEACTIVATED → ACTIVE.
    pub async fn subscribe(&self, cmd: SubscribeCommand) -> Result<SubscribeResult, BillingError> {
        // 1. Validate input
        require("customer_ref", &cmd.customer_ref)?;
        require("payment_ref", &cmd.payment_ref)?;
        let order_id = OrderId::new(cmd.order_id.trim())?;
        let price = self.policy.prices.price_of(cmd.plan);

        // 2. Verify the immediate payment with the gateway
        let token = self.gateway.fetch_access_token().await?;
        self.verify_immediate_payment(&cmd, &order_id, price, &token)
            .await?;

        // 3. Check the subscriber may subscribe
        let mut uow = self.store.begin(&cmd.subscriber_id).await?;
        let existing = uow.subscription().await?;
        let key = uow.billing_key().await?;
        if SubscriptionState::derive(existing.as_ref(), key.as_ref()).is_in_service() {
            return Err(BillingError::AlreadySubscribed(cmd.subscriber_id));
        }

        // 4. Key, immediate charge, schedules
        let key = self
            .keys
            .mint_or_replace(uow.as_mut(), &cmd.customer_ref, cmd.plan, price)
            .await?;
        let charge = self
            .ledger
            .record_immediate_charge(
                uow.as_mut(),
                &key,
                order_id,
                &cmd.payment_ref,
                price,
                &self.policy.charge_name(cmd.plan),
            )
            .await?;
        let schedule = self.reconciler.extend(uow.as_mut(), &key, &token).await?;

        // 5. Subscription row follows the earliest schedule
        let next = self
            .ledger
            .next_billing_date(uow.as_mut(), &key.id, Timestamp::now())
            .await?;
        let subscription = match existing {
            Some(mut subscription) => {
                subscription.reactivate(cmd.plan, next);
                subscription
            }
            None => Subscription::new(cmd.subscriber_id.clone(), cmd.plan, next),
        };
        uow.save_subscription(&subscription).await?;
        uow.commit().await?;

        tracing::info!(
            subscriber_id = %cmd.subscriber_id,
            plan = %cmd.plan,
            order_id = %charge.order_id,
            scheduled = schedule.registered,
            "Subscription started"
        );

        Ok(SubscribeResult {
            subscription,
            billing_key: key,
            charge,
            schedule,
        })
    }

    /// ACTIVE → CANCEL_PENDING. Remote schedules stay untouched until the sweep.
    pub async fn cancel(&self, subscriber: &SubscriberId) -> Result<CancelResult, BillingError> {
        let mut uow = self.store.begin(subscriber).await?;
        let (subscription, state) = self.load(uow.as_mut()).await?;

        match state {
            SubscriptionState::CancelPending | SubscriptionState::Deactivated => {
                return Err(BillingError::AlreadyCanceled(subscriber.clone()));
            }
            _ => state.ensure_can_move_to(SubscriptionState::CancelPending)?,
        }

        let effective = subscription.next_billing_date.date();
        let billing_key = self
            .keys
            .request_deactivation(uow.as_mut(), effective)
            .await?;
        uow.commit().await?;

        tracing::info!(
            subscriber_id = %subscriber,
            deactivation_date = %effective,
            "Cancellation scheduled"
        );

        Ok(CancelResult {
            billing_key,
            deactivation_date: effective,
        })
    }

    /// CANCEL_PENDING → ACTIVE. Schedules and next billing date are left as they are.
    pub async fn restore(&self, subscriber: &SubscriberId) -> Result<BillingKey, BillingError> {
        let mut uow = self.store.begin(subscriber).await?;
        let (_, state) = self.load(uow.as_mut()).await?;

        if state != SubscriptionState::CancelPending {
            return Err(BillingError::NothingPending(subscriber.clone()));
        }

        let key = self.keys.restore(uow.as_mut()).await?;
        uow.commit().await?;

        tracing::info!(subscriber_id = %subscriber, "Cancellation withdrawn");
        Ok(key)
    }

    /// Moves schedules onto a new card. The lifecycle state does not change.
    pub async fn change_card(
        &self,
        cmd: ChangeCardCommand,
    ) -> Result<ChangeCardResult, BillingError> {
        require("customer_ref", &cmd.customer_ref)?;
        let token = self.gateway.fetch_access_token().await?;

        let mut uow = self.store.begin(&cmd.subscriber_id).await?;
        let (mut subscription, _) = self.load(uow.as_mut()).await?;

        let outcome = self
            .keys
            .change_card(uow.as_mut(), cmd.customer_ref.trim(), &token)
            .await?;

        let next = self
            .ledger
            .next_billing_date(uow.as_mut(), &outcome.key.id, Timestamp::now())
            .await?;
        subscription.set_next_billing_date(next);
        uow.save_subscription(&subscription).await?;
        uow.commit().await?;

        Ok(ChangeCardResult {
            subscription,
            outcome,
        })
    }

    /// Strips personal data from the subscriber's payment history.
    ///
    /// Refused while the subscription is still in service.
    pub async fn anonymize_history(&self, subscriber: &SubscriberId) -> Result<usize, BillingError> {
        let mut uow = self.store.begin(subscriber).await?;
        let subscription = uow.subscription().await?;
        let key = uow.billing_key().await?;
        if SubscriptionState::derive(subscription.as_ref(), key.as_ref()).is_in_service() {
            return Err(BillingError::SubscriptionStillActive(subscriber.clone()));
        }

        let count = self.ledger.anonymize(uow.as_mut()).await?;
        uow.commit().await?;

        tracing::info!(subscriber_id = %subscriber, entries = count, "Payment history anonymized");
        Ok(count)
    }

    async fn load(
        &self,
        uow: &mut dyn BillingUnitOfWork,
    ) -> Result<(Subscription, SubscriptionState), BillingError> {
        let subscription = uow.subscription().await?;
        let key = uow.billing_key().await?;
        let state = SubscriptionState::derive(subscription.as_ref(), key.as_ref());
        match subscription {
            Some(subscription) => Ok((subscription, state)),
            None => Err(BillingError::NotSubscribed(uow.subscriber_id().clone())),
        }
    }

    async fn verify_immediate_payment(
        &self,
        cmd: &SubscribeCommand,
        order_id: &OrderId,
        price: i64,
        token: &AccessToken,
    ) -> Result<(), BillingError> {
        let reject = |reason: String| {
            tracing::warn!(
                subscriber_id = %cmd.subscriber_id,
                payment_ref = %cmd.payment_ref,
                reason = %reason,
                "Immediate payment rejected"
            );
            BillingError::verification_failed(cmd.payment_ref.clone(), reason)
        };

        let record = match self.gateway.verify_payment(&cmd.payment_ref, token).await? {
            Some(record) => record,
            None => return Err(reject("payment not found".to_string())),
        };
        if record.status != RemotePaymentStatus::Paid {
            return Err(reject(format!("payment status is {:?}", record.status)));
        }
        if record.order_id != order_id.as_str() {
            return Err(reject(format!(
                "payment belongs to order {}",
                record.order_id
            )));
        }
        if record.amount != price {
            return Err(reject(format!(
                "paid {} but {} costs {}",
                record.amount, cmd.plan, price
            )));
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<(), BillingError> {
    if value.trim().is_empty() {
        return Err(BillingError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingStore, InMemorySubscriberDirectory};
    use crate::adapters::portone::MockPaymentGateway;
    use crate::domain::billing::PaymentStatus;

    struct Fixture {
        store: InMemoryBillingStore,
        gateway: MockPaymentGateway,
        manager: SubscriptionManager,
        alice: SubscriberId,
    }

    fn fixture() -> Fixture {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let gateway_port: Arc<dyn PaymentGateway> = Arc::new(gateway.clone());
        let policy = BillingPolicy::default();
        let reconciler = Arc::new(ScheduleReconciler::new(
            gateway_port.clone(),
            Arc::new(InMemorySubscriberDirectory::new()),
            policy.clone(),
        ));
        let keys = Arc::new(BillingKeyManager::new(gateway_port.clone(), reconciler.clone()));
        let manager = SubscriptionManager::new(
            Arc::new(store.clone()),
            gateway_port,
            keys,
            reconciler,
            policy,
        );
        Fixture {
            store,
            gateway,
            manager,
            alice: SubscriberId::new("alice").unwrap(),
        }
    }

    fn subscribe_cmd(f: &Fixture, order: &str) -> SubscribeCommand {
        SubscribeCommand {
            subscriber_id: f.alice.clone(),
            plan: PlanCode::Basic,
            customer_ref: "customer_alice".into(),
            payment_ref: format!("imp_{}", order),
            order_id: order.into(),
        }
    }

    async fn subscribed(f: &Fixture) -> SubscribeResult {
        f.gateway.add_paid_payment("imp_first", "first", 9_900);
        f.manager.subscribe(subscribe_cmd(f, "first")).await.unwrap()
    }

    #[tokio::test]
    async fn subscribe_records_charge_and_twelve_schedules() {
        let f = fixture();
        let result = subscribed(&f).await;

        let entries = f.store.list_entries(&f.alice).await.unwrap();
        assert_eq!(entries.len(), 13);
        assert_eq!(
            entries.iter().filter(|e| e.status == PaymentStatus::Paid).count(),
            1
        );
        assert_eq!(result.charge.display_name, "BASIC subscription");
        assert_eq!(result.schedule.registered, 12);
        assert_eq!(
            Some(result.subscription.next_billing_date),
            result.schedule.first_charge_at
        );
        assert!(result.subscription.is_active);
        assert_eq!(result.billing_key.subscription_cycle, 1);
    }

    #[tokio::test]
    async fn subscribe_twice_is_rejected() {
        let f = fixture();
        subscribed(&f).await;
        f.gateway.add_paid_payment("imp_second", "second", 9_900);

        let err = f
            .manager
            .subscribe(subscribe_cmd(&f, "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::AlreadySubscribed(_)));
    }

    #[tokio::test]
    async fn subscribe_rejects_unverified_payments() {
        let f = fixture();

        // unknown payment
        let err = f
            .manager
            .subscribe(subscribe_cmd(&f, "first"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::VerificationFailed { .. }));

        // wrong amount
        f.gateway.add_paid_payment("imp_first", "first", 100);
        let err = f
            .manager
            .subscribe(subscribe_cmd(&f, "first"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::VerificationFailed { .. }));

        // payment for another order
        f.gateway.add_paid_payment("imp_first", "other", 9_900);
        let err = f
            .manager
            .subscribe(subscribe_cmd(&f, "first"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::VerificationFailed { .. }));

        assert!(f.store.list_entries(&f.alice).await.unwrap().is_empty());
        assert!(!f.gateway.was_called("register_schedules"));
    }

    #[tokio::test]
    async fn subscribe_rolls_back_when_schedule_registration_fails() {
        let f = fixture();
        f.gateway.add_paid_payment("imp_first", "first", 9_900);
        f.gateway.reject_next_registration("card declined");

        let err = f
            .manager
            .subscribe(subscribe_cmd(&f, "first"))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ScheduleRegistrationFailed { .. }));
        assert!(f.store.list_entries(&f.alice).await.unwrap().is_empty());
        assert!(f.store.find_billing_key(&f.alice).await.unwrap().is_none());
        assert!(f.store.subscription_of(&f.alice).await.is_none());
    }

    #[tokio::test]
    async fn subscribe_requires_fields() {
        let f = fixture();
        let mut cmd = subscribe_cmd(&f, "first");
        cmd.customer_ref = "  ".into();

        let err = f.manager.subscribe(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation { .. }));
        assert!(!f.gateway.was_called("fetch_access_token"));
    }

    #[tokio::test]
    async fn cancel_defers_and_keeps_service() {
        let f = fixture();
        let subscribed = subscribed(&f).await;
        f.gateway.clear_calls();

        let result = f.manager.cancel(&f.alice).await.unwrap();

        assert_eq!(
            result.deactivation_date,
            subscribed.subscription.next_billing_date.date()
        );
        assert!(result.billing_key.is_active);
        assert!(f.gateway.calls().is_empty());
        assert_eq!(f.gateway.scheduled_for("customer_alice").len(), 12);
        assert!(f.store.subscription_of(&f.alice).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn cancel_twice_is_rejected() {
        let f = fixture();
        subscribed(&f).await;
        f.manager.cancel(&f.alice).await.unwrap();

        let err = f.manager.cancel(&f.alice).await.unwrap_err();
        assert!(matches!(err, BillingError::AlreadyCanceled(_)));
    }

    #[tokio::test]
    async fn cancel_without_subscription_fails() {
        let f = fixture();
        let err = f.manager.cancel(&f.alice).await.unwrap_err();
        assert!(matches!(err, BillingError::NotSubscribed(_)));
    }

    #[tokio::test]
    async fn restore_undoes_cancel_exactly() {
        let f = fixture();
        subscribed(&f).await;
        let by_order = |mut entries: Vec<LedgerEntry>| {
            entries.sort_by(|a, b| a.order_id.as_str().cmp(b.order_id.as_str()));
            entries
        };
        let before = by_order(f.store.list_entries(&f.alice).await.unwrap());

        f.manager.cancel(&f.alice).await.unwrap();
        let key = f.manager.restore(&f.alice).await.unwrap();

        assert!(key.deactivation_date.is_none());
        let after = by_order(f.store.list_entries(&f.alice).await.unwrap());
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn restore_without_pending_cancel_fails() {
        let f = fixture();
        subscribed(&f).await;
        let err = f.manager.restore(&f.alice).await.unwrap_err();
        assert!(matches!(err, BillingError::NothingPending(_)));
    }

    #[tokio::test]
    async fn change_card_updates_next_billing_date() {
        let f = fixture();
        subscribed(&f).await;
        f.gateway.set_card("customer_new", "Hyundai", "4321-56**-****-0000");

        let result = f
            .manager
            .change_card(ChangeCardCommand {
                subscriber_id: f.alice.clone(),
                customer_ref: "customer_new".into(),
            })
            .await
            .unwrap();

        assert_eq!(result.outcome.key.customer_ref, "customer_new");
        assert_eq!(
            Some(result.subscription.next_billing_date),
            result.outcome.schedule.first_charge_at
        );
        let stored = f.store.subscription_of(&f.alice).await.unwrap();
        assert_eq!(stored.next_billing_date, result.subscription.next_billing_date);
    }

    #[tokio::test]
    async fn anonymize_refused_while_in_service() {
        let f = fixture();
        subscribed(&f).await;
        f.manager.cancel(&f.alice).await.unwrap();

        let err = f.manager.anonymize_history(&f.alice).await.unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionStillActive(_)));
    }

    #[tokio::test]
    async fn anonymize_after_deactivation() {
        let f = fixture();
        subscribed(&f).await;
        {
            let mut uow = f.store.begin(&f.alice).await.unwrap();
            let mut subscription = uow.subscription().await.unwrap().unwrap();
            subscription.deactivate();
            uow.save_subscription(&subscription).await.unwrap();
            uow.commit().await.unwrap();
        }

        let count = f.manager.anonymize_history(&f.alice).await.unwrap();

        assert_eq!(count, 13);
        assert!(f.store.list_entries(&f.alice).await.unwrap().is_empty());
    }
}
