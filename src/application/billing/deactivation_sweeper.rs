//! DeactivationSweeper - daily batch finalizing deferred cancellations.
//!
//! Each due subscriber is finalized in its own unit of work. A failure is
//! logged and recorded in the report; the batch moves on. Finalized keys are
//! inactive and drop out of the due query, so re-running on the same day is
//! a no-op.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::billing::BillingError;
use crate::domain::foundation::SubscriberId;
use crate::ports::{AccessToken, BillingStore, PaymentGateway};

use super::{BillingKeyManager, ScheduleTeardown};

/// A subscriber the sweep could not finalize.
#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub subscriber_id: SubscriberId,
    pub error: BillingError,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub finalized: Vec<SubscriberId>,
    /// Due when queried, no longer due once locked (restored meanwhile).
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

enum Finalized {
    Done(ScheduleTeardown),
    NotDue,
}

pub struct DeactivationSweeper {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    keys: Arc<BillingKeyManager>,
}

impl DeactivationSweeper {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        keys: Arc<BillingKeyManager>,
    ) -> Self {
        Self {
            store,
            gateway,
            keys,
        }
    }

    /// Finalizes every active key whose deactivation date is on or before `today`.
    ///
    /// Fails only when the due keys can't be listed or no gateway token can
    /// be obtained. Per-subscriber failures end up in the report.
    pub async fn run(&self, today: NaiveDate) -> Result<SweepReport, BillingError> {
        let due = self.store.find_due_deactivations(today).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            tracing::info!(%today, "No deactivations due");
            return Ok(report);
        }

        let token = self.gateway.fetch_access_token().await?;

        for key in due {
            let subscriber = key.subscriber_id;
            match self.finalize_one(&subscriber, today, &token).await {
                Ok(Finalized::Done(teardown)) => {
                    tracing::info!(
                        subscriber_id = %subscriber,
                        canceled = teardown.canceled,
                        error_sync = teardown.error_sync,
                        "Subscription deactivated"
                    );
                    report.finalized.push(subscriber);
                }
                Ok(Finalized::NotDue) => {
                    tracing::debug!(subscriber_id = %subscriber, "No longer due, skipped");
                    report.skipped += 1;
                }
                Err(error) => {
                    tracing::error!(
                        subscriber_id = %subscriber,
                        error = %error,
                        retryable = error.is_retryable(),
                        "Deactivation failed"
                    );
                    report.failures.push(SweepFailure {
                        subscriber_id: subscriber,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            %today,
            examined = report.examined,
            finalized = report.finalized.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "Deactivation sweep finished"
        );
        Ok(report)
    }

    async fn finalize_one(
        &self,
        subscriber: &SubscriberId,
        today: NaiveDate,
        token: &AccessToken,
    ) -> Result<Finalized, BillingError> {
        let mut uow = self.store.begin(subscriber).await?;

        // Re-check under the lock; a restore may have won the race.
        let key = uow.billing_key().await?;
        if !key.map_or(false, |k| k.is_due_for_deactivation(today)) {
            return Ok(Finalized::NotDue);
        }

        let (_, teardown) = self.keys.finalize(uow.as_mut(), token).await?;

        let subscription = uow.subscription().await?;
        if let Some(mut subscription) = subscription {
            subscription.deactivate();
            uow.save_subscription(&subscription).await?;
        }
        uow.commit().await?;

        Ok(Finalized::Done(teardown))
    }
}
