//! BillingKeyManager - lifecycle of a subscriber's single billing key.
//!
//! Every operation works inside the caller's unit of work. Nothing here
//! commits, so a failure anywhere leaves the stored key as it was.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::billing::{BillingError, BillingKey, OrderId, PlanCode};
use crate::ports::{AccessToken, BillingUnitOfWork, GatewayError, PaymentGateway};

use super::{Ledger, ReconcileOutcome, ScheduleReconciler};

/// Local effect of withdrawing a key's remote schedules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleTeardown {
    /// Rows the gateway confirmed withdrawn, now `canceled`.
    pub canceled: usize,
    /// Rows the gateway did not account for, now `error_sync`.
    pub error_sync: usize,
}

/// Result of a card change.
#[derive(Debug, Clone)]
pub struct CardChangeOutcome {
    pub key: BillingKey,
    pub previous_customer_ref: String,
    pub teardown: ScheduleTeardown,
    pub schedule: ReconcileOutcome,
}

pub struct BillingKeyManager {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ScheduleReconciler>,
    ledger: Ledger,
}

impl BillingKeyManager {
    pub fn new(gateway: Arc<dyn PaymentGateway>, reconciler: Arc<ScheduleReconciler>) -> Self {
        Self {
            gateway,
            reconciler,
            ledger: Ledger::new(),
        }
    }

    /// Upserts the subscriber's key. An existing row is overwritten in place
    /// so ledger rows keep pointing at it.
    pub async fn mint_or_replace(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        customer_ref: &str,
        plan: PlanCode,
        amount: i64,
    ) -> Result<BillingKey, BillingError> {
        let existing = uow.billing_key().await?;
        let key = match existing {
            Some(mut existing) => {
                existing.overwrite(customer_ref, plan, amount);
                existing
            }
            None => BillingKey::new(uow.subscriber_id().clone(), customer_ref, plan, amount),
        };
        uow.save_billing_key(&key).await?;
        Ok(key)
    }

    /// Moves the subscriber's schedules onto a new card.
    ///
    /// The new card is checked with the gateway first. Then the old
    /// reference's schedules are withdrawn, the reference swapped and a fresh
    /// horizon registered under the new one.
    pub async fn change_card(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        new_customer_ref: &str,
        token: &AccessToken,
    ) -> Result<CardChangeOutcome, BillingError> {
        let mut key = self.active_key(uow).await?;

        // 1. Verify the new card exists on the gateway
        if self
            .gateway
            .fetch_customer_card(new_customer_ref, token)
            .await?
            .is_none()
        {
            return Err(BillingError::verification_failed(
                new_customer_ref,
                "no card registered for customer reference",
            ));
        }

        // 2-3. Withdraw schedules of the old reference
        let teardown = self.withdraw_schedules(uow, &key, token).await?;

        // 4. Swap the reference
        let previous_customer_ref = key.swap_customer_ref(new_customer_ref);
        uow.save_billing_key(&key).await?;

        // 5. Regenerate under the new reference
        let schedule = self.reconciler.extend(uow, &key, token).await?;

        tracing::info!(
            subscriber_id = %key.subscriber_id,
            previous_customer_ref = %previous_customer_ref,
            customer_ref = %key.customer_ref,
            canceled = teardown.canceled,
            error_sync = teardown.error_sync,
            registered = schedule.registered,
            "Billing key moved to new card"
        );

        Ok(CardChangeOutcome {
            key,
            previous_customer_ref,
            teardown,
            schedule,
        })
    }

    /// Defers cancellation to `effective`. Nothing is withdrawn yet.
    pub async fn request_deactivation(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        effective: NaiveDate,
    ) -> Result<BillingKey, BillingError> {
        let stored = uow.billing_key().await?;
        let mut key = match stored {
            Some(key) => key,
            None => return Err(BillingError::NoActiveBillingKey(uow.subscriber_id().clone())),
        };
        key.request_deactivation(effective)?;
        uow.save_billing_key(&key).await?;
        Ok(key)
    }

    /// Clears a pending deactivation.
    pub async fn restore(&self, uow: &mut dyn BillingUnitOfWork) -> Result<BillingKey, BillingError> {
        let stored = uow.billing_key().await?;
        let mut key = match stored {
            Some(key) => key,
            None => return Err(BillingError::NoActiveBillingKey(uow.subscriber_id().clone())),
        };
        key.restore()?;
        uow.save_billing_key(&key).await?;
        Ok(key)
    }

    /// Withdraws the key's schedules and deactivates it.
    pub async fn finalize(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        token: &AccessToken,
    ) -> Result<(BillingKey, ScheduleTeardown), BillingError> {
        let mut key = self.active_key(uow).await?;
        let teardown = self.withdraw_schedules(uow, &key, token).await?;
        key.deactivate();
        uow.save_billing_key(&key).await?;
        Ok((key, teardown))
    }

    async fn active_key(&self, uow: &mut dyn BillingUnitOfWork) -> Result<BillingKey, BillingError> {
        let key = uow.billing_key().await?;
        match key {
            Some(key) if key.is_active => Ok(key),
            _ => Err(BillingError::NoActiveBillingKey(uow.subscriber_id().clone())),
        }
    }

    /// Cancels the remote schedules of `key` and settles the local rows.
    ///
    /// Rows the gateway echoes back become `canceled`; the rest become
    /// `error_sync`. A gateway holding nothing for the reference accounts for
    /// none of them. Any other refusal aborts, since the remote schedules may
    /// still be live.
    async fn withdraw_schedules(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key: &BillingKey,
        token: &AccessToken,
    ) -> Result<ScheduleTeardown, BillingError> {
        let result = self
            .gateway
            .cancel_schedules(&key.customer_ref, token)
            .await?;

        let withdrawn: HashSet<&OrderId> = if result.success {
            result.entries.iter().map(|e| &e.order_id).collect()
        } else if result.is_nothing_scheduled() {
            HashSet::new()
        } else {
            let reason = result
                .message
                .clone()
                .unwrap_or_else(|| "gateway refused unschedule".to_string());
            tracing::error!(
                subscriber_id = %key.subscriber_id,
                customer_ref = %key.customer_ref,
                reason = %reason,
                "Schedule withdrawal refused"
            );
            return Err(GatewayError::provider(format!(
                "unschedule refused for {}: {}",
                key.customer_ref, reason
            ))
            .into());
        };

        let drifted: HashSet<OrderId> = self
            .ledger
            .scheduled_rows(uow, &key.id)
            .await?
            .into_iter()
            .map(|e| e.order_id)
            .filter(|id| !withdrawn.contains(id))
            .collect();

        if !drifted.is_empty() {
            tracing::warn!(
                subscriber_id = %key.subscriber_id,
                customer_ref = %key.customer_ref,
                drifted = drifted.len(),
                gateway_message = result.message.as_deref().unwrap_or(""),
                "Local schedules missing remotely, marking error_sync"
            );
        }

        let error_sync = self.ledger.mark_error_sync(uow, &key.id, &drifted).await?;
        let canceled = self.ledger.cancel_scheduled(uow, &key.id).await?;

        Ok(ScheduleTeardown {
            canceled,
            error_sync,
        })
    }
}
