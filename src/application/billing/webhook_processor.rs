//! WebhookProcessor - applies gateway charge notifications to the ledger.
//!
//! Notifications are delivered at least once and may be forged. The
//! processor only acts on order ids it already knows, re-verifies every
//! payment with the gateway, and treats a repeat of an already-applied
//! terminal status as success without side effects.

use std::sync::Arc;

use crate::domain::billing::{BillingError, OrderId, PaymentStatus, StatusChange};
use crate::domain::foundation::Timestamp;
use crate::ports::{AccessToken, BillingStore, PaymentGateway};

use super::{BillingPolicy, Ledger, ScheduleReconciler};

/// Raw notification payload. Fields are validated by the processor.
#[derive(Debug, Clone)]
pub struct WebhookCommand {
    pub payment_ref: String,
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Same terminal status delivered again. Nothing changed.
    Duplicate,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub outcome: WebhookOutcome,
    /// Charges registered because the schedule ran low.
    pub scheduled_top_up: usize,
}

impl WebhookAck {
    pub fn message(&self) -> String {
        match self.outcome {
            WebhookOutcome::Applied => format!("order {} marked {}", self.order_id, self.status),
            WebhookOutcome::Duplicate => {
                format!("order {} already {}", self.order_id, self.status)
            }
        }
    }
}

pub struct WebhookProcessor {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ScheduleReconciler>,
    ledger: Ledger,
    policy: BillingPolicy,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<ScheduleReconciler>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            reconciler,
            ledger: Ledger::new(),
            policy,
        }
    }

    pub async fn handle(&self, cmd: WebhookCommand) -> Result<WebhookAck, BillingError> {
        let (payment_ref, order_id, status) = parse(&cmd)?;

        // 1. Only known orders are processed
        let entry = self
            .store
            .find_entry_by_order_id(&order_id)
            .await?
            .ok_or_else(|| BillingError::UnknownOrder(order_id.to_string()))?;
        let subscriber = entry
            .subscriber_id
            .clone()
            .ok_or_else(|| BillingError::UnknownOrder(order_id.to_string()))?;

        // 2. Never trust the payload's status
        let token = self.gateway.fetch_access_token().await?;
        self.verify(&payment_ref, &order_id, status, &token).await?;

        // 3-4. Apply under the subscriber's lock
        let mut uow = self.store.begin(&subscriber).await?;
        let (entry, change) = self
            .ledger
            .apply_status(uow.as_mut(), &order_id, status, Some(&payment_ref))
            .await?;

        if change == StatusChange::Unchanged {
            tracing::info!(
                subscriber_id = %subscriber,
                order_id = %order_id,
                status = %status,
                "Duplicate webhook ignored"
            );
            return Ok(WebhookAck {
                order_id,
                status,
                outcome: WebhookOutcome::Duplicate,
                scheduled_top_up: 0,
            });
        }

        // 5. Follow-up on the key and subscription
        let mut scheduled_top_up = 0;
        let stored_key = uow.billing_key().await?;
        match stored_key {
            // The subscription is over; only the ledger row records the charge
            Some(key) if !key.is_active => {
                tracing::warn!(
                    subscriber_id = %subscriber,
                    order_id = %order_id,
                    status = %status,
                    billing_key_id = %key.id,
                    "Charge reported for deactivated billing key, left for manual reconciliation"
                );
            }
            Some(mut key) => {
                let paid_on_current_key =
                    status == PaymentStatus::Paid && entry.belongs_to_key(&key.id);

                if paid_on_current_key {
                    key.record_successful_charge();
                    uow.save_billing_key(&key).await?;
                }

                // No top-up once a cancellation is pending
                if paid_on_current_key && !key.is_pending_deactivation() {
                    let upcoming = self
                        .ledger
                        .count_upcoming(uow.as_mut(), Timestamp::now())
                        .await?;
                    if upcoming < self.policy.top_up_threshold {
                        scheduled_top_up = self
                            .reconciler
                            .extend(uow.as_mut(), &key, &token)
                            .await?
                            .registered;
                    }
                }

                let stored_subscription = uow.subscription().await?;
                if let Some(mut subscription) = stored_subscription {
                    let next = self
                        .ledger
                        .next_billing_date(uow.as_mut(), &key.id, Timestamp::now())
                        .await?;
                    subscription.set_next_billing_date(next);
                    uow.save_subscription(&subscription).await?;
                }

                tracing::info!(
                    subscriber_id = %subscriber,
                    order_id = %order_id,
                    status = %status,
                    subscription_cycle = key.subscription_cycle,
                    scheduled_top_up,
                    "Webhook applied"
                );
            }
            None => {}
        }

        uow.commit().await?;

        Ok(WebhookAck {
            order_id,
            status,
            outcome: WebhookOutcome::Applied,
            scheduled_top_up,
        })
    }

    async fn verify(
        &self,
        payment_ref: &str,
        order_id: &OrderId,
        status: PaymentStatus,
        token: &AccessToken,
    ) -> Result<(), BillingError> {
        let reason = match self.gateway.verify_payment(payment_ref, token).await? {
            None => "payment unknown to gateway".to_string(),
            Some(record) if record.order_id != order_id.as_str() => {
                format!("payment belongs to order {}", record.order_id)
            }
            Some(record) if !record.status.confirms(status) => {
                format!("gateway reports {:?}, webhook claims {}", record.status, status)
            }
            Some(_) => return Ok(()),
        };

        tracing::warn!(
            payment_ref = %payment_ref,
            order_id = %order_id,
            reason = %reason,
            "Webhook verification failed"
        );
        Err(BillingError::verification_failed(payment_ref, reason))
    }
}

fn parse(cmd: &WebhookCommand) -> Result<(String, OrderId, PaymentStatus), BillingError> {
    let payment_ref = cmd.payment_ref.trim();
    if payment_ref.is_empty() {
        return Err(BillingError::validation("paymentRef", "must not be empty"));
    }
    if cmd.order_id.trim().is_empty() {
        return Err(BillingError::validation("orderId", "must not be empty"));
    }
    let order_id = OrderId::new(cmd.order_id.trim())?;

    let status = match cmd.status.trim().to_ascii_lowercase().as_str() {
        "" => return Err(BillingError::validation("status", "must not be empty")),
        s @ ("paid" | "failed" | "cancelled" | "canceled") => s.parse::<PaymentStatus>()?,
        other => {
            return Err(BillingError::validation(
                "status",
                format!("unsupported status '{}'", other),
            ))
        }
    };

    Ok((payment_ref.to_string(), order_id, status))
}
