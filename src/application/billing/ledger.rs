//! Ledger - payment history operations inside a unit of work.
//!
//! The ledger never opens its own transaction. Every call works on the
//! caller's [`BillingUnitOfWork`], so a use case's ledger writes commit or
//! roll back together with its billing key and subscription changes.

use std::collections::HashSet;

use crate::domain::billing::{
    fallback_next_billing_date, BillingError, BillingKey, LedgerEntry, OrderId, PaymentStatus,
    StatusChange,
};
use crate::domain::foundation::{BillingKeyId, Timestamp};
use crate::ports::BillingUnitOfWork;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ledger;

impl Ledger {
    pub fn new() -> Self {
        Self
    }

    /// Records a charge that already went through.
    pub async fn record_immediate_charge(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key: &BillingKey,
        order_id: OrderId,
        payment_ref: &str,
        amount: i64,
        display_name: &str,
    ) -> Result<LedgerEntry, BillingError> {
        let entry = LedgerEntry::immediate(
            key.subscriber_id.clone(),
            key.id,
            order_id,
            payment_ref,
            display_name,
            amount,
        );
        uow.insert_entry(&entry).await?;
        tracing::debug!(
            subscriber_id = %key.subscriber_id,
            order_id = %entry.order_id,
            amount,
            "Recorded immediate charge"
        );
        Ok(entry)
    }

    /// Records a schedule the gateway confirmed.
    ///
    /// Fails with `DuplicateOrderId` if the order id is already recorded.
    pub async fn record_scheduled_charge(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key: &BillingKey,
        order_id: OrderId,
        scheduled_at: Timestamp,
        amount: i64,
        display_name: &str,
    ) -> Result<LedgerEntry, BillingError> {
        let entry = LedgerEntry::scheduled(
            key.subscriber_id.clone(),
            key.id,
            order_id,
            scheduled_at,
            display_name,
            amount,
        );
        uow.insert_entry(&entry).await?;
        Ok(entry)
    }

    /// Marks an entry paid. Re-marking a paid entry is a no-op.
    pub async fn mark_paid(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        order_id: &OrderId,
        payment_ref: &str,
    ) -> Result<(LedgerEntry, StatusChange), BillingError> {
        self.apply_status(uow, order_id, PaymentStatus::Paid, Some(payment_ref))
            .await
    }

    /// Applies a status to the entry with `order_id`.
    pub async fn apply_status(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        order_id: &OrderId,
        status: PaymentStatus,
        payment_ref: Option<&str>,
    ) -> Result<(LedgerEntry, StatusChange), BillingError> {
        let mut entry = uow
            .entry_by_order_id(order_id)
            .await?
            .ok_or_else(|| BillingError::UnknownOrder(order_id.to_string()))?;

        let change = entry.apply_status(status, payment_ref)?;
        if change == StatusChange::Applied {
            uow.update_entry(&entry).await?;
        }
        Ok((entry, change))
    }

    /// Moves every `scheduled` row of the key to `canceled`.
    pub async fn cancel_scheduled(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
    ) -> Result<usize, BillingError> {
        self.transition_scheduled(uow, key_id, PaymentStatus::Canceled, |_| true)
            .await
    }

    /// Moves the key's `scheduled` rows listed in `order_ids` to `error_sync`.
    pub async fn mark_error_sync(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
        order_ids: &HashSet<OrderId>,
    ) -> Result<usize, BillingError> {
        self.transition_scheduled(uow, key_id, PaymentStatus::ErrorSync, |e| {
            order_ids.contains(&e.order_id)
        })
        .await
    }

    async fn transition_scheduled(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
        target: PaymentStatus,
        select: impl Fn(&LedgerEntry) -> bool + Send,
    ) -> Result<usize, BillingError> {
        let mut count = 0;
        for mut entry in self.scheduled_rows(uow, key_id).await? {
            if !select(&entry) {
                continue;
            }
            entry.apply_status(target, None)?;
            uow.update_entry(&entry).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Open schedules of the key, earliest first.
    pub async fn scheduled_rows(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
    ) -> Result<Vec<LedgerEntry>, BillingError> {
        let mut rows: Vec<_> = uow
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.is_scheduled() && e.belongs_to_key(key_id))
            .collect();
        rows.sort_by_key(|e| e.scheduled_at);
        Ok(rows)
    }

    pub async fn earliest_scheduled(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
    ) -> Result<Option<LedgerEntry>, BillingError> {
        Ok(self.scheduled_rows(uow, key_id).await?.into_iter().next())
    }

    pub async fn latest_scheduled(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
    ) -> Result<Option<LedgerEntry>, BillingError> {
        Ok(self.scheduled_rows(uow, key_id).await?.into_iter().last())
    }

    /// Scheduled charges of the subscriber due at or after `from`.
    pub async fn count_upcoming(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        from: Timestamp,
    ) -> Result<usize, BillingError> {
        Ok(uow
            .entries()
            .await?
            .iter()
            .filter(|e| e.is_scheduled() && e.scheduled_at.map_or(false, |at| at >= from))
            .count())
    }

    /// Charge time of the key's earliest open schedule, or one period from `now`.
    pub async fn next_billing_date(
        &self,
        uow: &mut dyn BillingUnitOfWork,
        key_id: &BillingKeyId,
        now: Timestamp,
    ) -> Result<Timestamp, BillingError> {
        Ok(self
            .earliest_scheduled(uow, key_id)
            .await?
            .and_then(|e| e.scheduled_at)
            .unwrap_or_else(|| fallback_next_billing_date(now)))
    }

    /// Order ids already in the subscriber's history and the next sequence
    /// number for generated ones.
    pub async fn order_id_state(
        &self,
        uow: &mut dyn BillingUnitOfWork,
    ) -> Result<(HashSet<OrderId>, u64), BillingError> {
        let entries = uow.entries().await?;
        let next_seq = entries.len() as u64 + 1;
        Ok((entries.into_iter().map(|e| e.order_id).collect(), next_seq))
    }

    /// Strips personal data from every entry of the subscriber and detaches
    /// them. Returns the number of rows rewritten.
    pub async fn anonymize(&self, uow: &mut dyn BillingUnitOfWork) -> Result<usize, BillingError> {
        let entries = uow.entries().await?;
        let count = entries.len();
        for mut entry in entries {
            entry.anonymize();
            uow.update_entry(&entry).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::PlanCode;
    use crate::domain::foundation::SubscriberId;
    use crate::ports::BillingStore;

    fn subscriber() -> SubscriberId {
        SubscriberId::new("alice").unwrap()
    }

    fn key() -> BillingKey {
        BillingKey::new(subscriber(), "customer_alice", PlanCode::Basic, 9_900)
    }

    fn order(id: &str) -> OrderId {
        OrderId::new(id).unwrap()
    }

    async fn seeded(
        store: &InMemoryBillingStore,
        key: &BillingKey,
        months: u32,
    ) -> Box<dyn BillingUnitOfWork> {
        let ledger = Ledger::new();
        let mut uow = store.begin(&key.subscriber_id).await.unwrap();
        uow.save_billing_key(key).await.unwrap();
        for month in 1..=months {
            ledger
                .record_scheduled_charge(
                    uow.as_mut(),
                    key,
                    order(&format!("scheduled_{}", month)),
                    Timestamp::now().add_months(month),
                    9_900,
                    "BASIC subscription",
                )
                .await
                .unwrap();
        }
        uow
    }

    #[tokio::test]
    async fn duplicate_scheduled_order_is_rejected_without_new_row() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 1).await;

        let err = Ledger::new()
            .record_scheduled_charge(
                uow.as_mut(),
                &key,
                order("scheduled_1"),
                Timestamp::now(),
                9_900,
                "BASIC subscription",
            )
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::DuplicateOrderId("scheduled_1".into()));
        assert_eq!(uow.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_paid_is_idempotent() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 1).await;
        let ledger = Ledger::new();

        let (_, first) = ledger
            .mark_paid(uow.as_mut(), &order("scheduled_1"), "imp_1")
            .await
            .unwrap();
        let (entry, second) = ledger
            .mark_paid(uow.as_mut(), &order("scheduled_1"), "imp_1")
            .await
            .unwrap();

        assert_eq!(first, StatusChange::Applied);
        assert_eq!(second, StatusChange::Unchanged);
        assert_eq!(entry.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn mark_paid_unknown_order_fails() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 0).await;

        let err = Ledger::new()
            .mark_paid(uow.as_mut(), &order("missing"), "imp_1")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::UnknownOrder(_)));
    }

    #[tokio::test]
    async fn cancel_scheduled_only_touches_open_rows_of_key() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 3).await;
        let ledger = Ledger::new();
        ledger
            .mark_paid(uow.as_mut(), &order("scheduled_1"), "imp_1")
            .await
            .unwrap();

        let count = ledger.cancel_scheduled(uow.as_mut(), &key.id).await.unwrap();

        assert_eq!(count, 2);
        let statuses: Vec<_> = uow
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses.iter().filter(|s| **s == PaymentStatus::Paid).count(), 1);
        assert_eq!(
            statuses.iter().filter(|s| **s == PaymentStatus::Canceled).count(),
            2
        );
    }

    #[tokio::test]
    async fn mark_error_sync_selects_listed_rows() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 3).await;
        let ledger = Ledger::new();

        let drifted: HashSet<_> = [order("scheduled_2")].into_iter().collect();
        let marked = ledger
            .mark_error_sync(uow.as_mut(), &key.id, &drifted)
            .await
            .unwrap();

        assert_eq!(marked, 1);
        let entry = uow
            .entry_by_order_id(&order("scheduled_2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, PaymentStatus::ErrorSync);
    }

    #[tokio::test]
    async fn earliest_and_latest_follow_schedule_time() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 3).await;
        let ledger = Ledger::new();

        let earliest = ledger.earliest_scheduled(uow.as_mut(), &key.id).await.unwrap();
        let latest = ledger.latest_scheduled(uow.as_mut(), &key.id).await.unwrap();

        assert_eq!(earliest.unwrap().order_id, order("scheduled_1"));
        assert_eq!(latest.unwrap().order_id, order("scheduled_3"));
    }

    #[tokio::test]
    async fn next_billing_date_falls_back_to_one_period() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 0).await;
        let now = Timestamp::now();

        let next = Ledger::new()
            .next_billing_date(uow.as_mut(), &key.id, now)
            .await
            .unwrap();
        assert_eq!(next, now.add_months(1));
    }

    #[tokio::test]
    async fn count_upcoming_ignores_past_and_closed_rows() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 3).await;
        let ledger = Ledger::new();
        ledger
            .mark_paid(uow.as_mut(), &order("scheduled_1"), "imp_1")
            .await
            .unwrap();

        let upcoming = ledger
            .count_upcoming(uow.as_mut(), Timestamp::now())
            .await
            .unwrap();
        assert_eq!(upcoming, 2);

        let later = ledger
            .count_upcoming(uow.as_mut(), Timestamp::now().add_months(3))
            .await
            .unwrap();
        assert_eq!(later, 1);
    }

    #[tokio::test]
    async fn anonymize_detaches_every_row() {
        let store = InMemoryBillingStore::new();
        let key = key();
        let mut uow = seeded(&store, &key, 2).await;

        let count = Ledger::new().anonymize(uow.as_mut()).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(count, 2);
        assert!(store.list_entries(&subscriber()).await.unwrap().is_empty());
        assert!(store
            .all_entries()
            .await
            .iter()
            .all(|e| e.subscriber_id.is_none() && e.billing_key_id.is_none()));
    }
}
