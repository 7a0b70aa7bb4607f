//! ScheduleReconciler - extends a billing key's remote schedule and mirrors it locally.
//!
//! A batch is registered with the gateway first. Local `scheduled` rows are
//! written only for the entries the gateway echoes back, paired by order id,
//! and only when the gateway reports overall success. A rejected batch writes
//! nothing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::billing::{charge_dates, schedule_base, BillingError, BillingKey, OrderId};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AccessToken, BillingUnitOfWork, BuyerContact, GatewayError, PaymentGateway, ScheduleRequest,
    SubscriberDirectory,
};

use super::{BillingPolicy, Ledger};

/// What a reconciliation run registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub registered: usize,
    pub first_charge_at: Option<Timestamp>,
    pub last_charge_at: Option<Timestamp>,
}

pub struct ScheduleReconciler {
    gateway: Arc<dyn PaymentGateway>,
    directory: Arc<dyn SubscriberDirectory>,
    ledger: Ledger,
    policy: BillingPolicy,
}

impl ScheduleReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        directory: Arc<dyn SubscriberDirectory>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            gateway,
            directory,
            ledger: Ledger::new(),
            policy,
        }
    }

    /// Registers `horizon_months` further charges for `key`, starting one
    /// period after its latest open schedule (or one period from now).
    pub async fn extend(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key: &BillingKey,
        token: &AccessToken,
    ) -> Result<ReconcileOutcome, BillingError> {
        let now = Timestamp::now();

        // 1. Plan dates from the current tail of the schedule
        let latest = self
            .ledger
            .latest_scheduled(uow, &key.id)
            .await?
            .and_then(|e| e.scheduled_at);
        let dates = charge_dates(schedule_base(latest, now), self.policy.horizon_months);
        if dates.is_empty() {
            return Ok(ReconcileOutcome {
                registered: 0,
                first_charge_at: None,
                last_charge_at: None,
            });
        }

        // 2. Synthesize order ids that collide with nothing already recorded
        let (mut taken, mut seq) = self.ledger.order_id_state(uow).await?;
        let display_name = self.policy.charge_name(key.plan);
        let buyer = self.buyer_contact(key).await;

        let mut requests = Vec::with_capacity(dates.len());
        for charge_at in dates {
            let order_id = loop {
                let candidate = OrderId::scheduled(&key.subscriber_id, now.as_unix_millis(), seq);
                seq += 1;
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
            };
            requests.push(ScheduleRequest {
                order_id,
                charge_at,
                amount: key.amount,
                display_name: display_name.clone(),
                buyer: buyer.clone(),
            });
        }

        // 3. Register the whole batch remotely
        let result = self
            .gateway
            .register_schedules(&key.customer_ref, &requests, token)
            .await?;

        if !result.success {
            let reason = result
                .message
                .unwrap_or_else(|| "gateway rejected schedule batch".to_string());
            tracing::warn!(
                subscriber_id = %key.subscriber_id,
                customer_ref = %key.customer_ref,
                requested = requests.len(),
                reason = %reason,
                "Schedule registration rejected"
            );
            return Err(BillingError::schedule_registration_failed(reason));
        }

        // 4. Pair confirmed entries with our requests by order id before writing
        let requested: HashSet<&OrderId> = requests.iter().map(|r| &r.order_id).collect();
        let mut seen = HashSet::with_capacity(result.entries.len());
        for confirmed in &result.entries {
            if !requested.contains(&confirmed.order_id) || !seen.insert(&confirmed.order_id) {
                return Err(GatewayError::malformed(format!(
                    "gateway confirmed unexpected schedule {}",
                    confirmed.order_id
                ))
                .into());
            }
        }

        // 5. Mirror confirmed schedules locally
        for confirmed in &result.entries {
            self.ledger
                .record_scheduled_charge(
                    uow,
                    key,
                    confirmed.order_id.clone(),
                    confirmed.charge_at,
                    key.amount,
                    &display_name,
                )
                .await?;
        }

        let first_charge_at = result.entries.iter().map(|e| e.charge_at).min();
        let last_charge_at = result.entries.iter().map(|e| e.charge_at).max();

        tracing::info!(
            subscriber_id = %key.subscriber_id,
            customer_ref = %key.customer_ref,
            registered = result.entries.len(),
            "Registered schedules"
        );

        Ok(ReconcileOutcome {
            registered: result.entries.len(),
            first_charge_at,
            last_charge_at,
        })
    }

    async fn buyer_contact(&self, key: &BillingKey) -> BuyerContact {
        match self.directory.contact(&key.subscriber_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => BuyerContact::default(),
            Err(e) => {
                tracing::warn!(
                    subscriber_id = %key.subscriber_id,
                    error = %e,
                    "Contact lookup failed, scheduling without buyer details"
                );
                BuyerContact::default()
            }
        }
    }
}
