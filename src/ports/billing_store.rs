//! Billing storage port.
//!
//! All mutations go through a [`BillingUnitOfWork`] opened for one
//! subscriber. Opening one serializes against every other unit of work
//! for the same subscriber (row or advisory lock in SQL stores, an async
//! mutex in memory). Nothing written through it is visible to others until
//! [`BillingUnitOfWork::commit`]; dropping it without committing discards
//! every write.
//!
//! Order-id uniqueness is enforced by the store itself, across all
//! subscribers. A conflicting insert fails with
//! `ErrorCode::DuplicateOrderId` and an `order_id` detail.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::billing::{BillingKey, LedgerEntry, OrderId, Subscription};
use crate::domain::foundation::{DomainError, SubscriberId};

/// Entry point to billing storage.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Opens a unit of work holding the subscriber's lock.
    ///
    /// Waits while another unit of work for the same subscriber is open.
    async fn begin(&self, subscriber: &SubscriberId)
        -> Result<Box<dyn BillingUnitOfWork>, DomainError>;

    /// Committed ledger entry by order id, across all subscribers.
    async fn find_entry_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// Committed ledger entries of a subscriber, newest first.
    async fn list_entries(&self, subscriber: &SubscriberId)
        -> Result<Vec<LedgerEntry>, DomainError>;

    /// Committed billing key of a subscriber.
    async fn find_billing_key(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<BillingKey>, DomainError>;

    /// Committed subscription of a subscriber.
    async fn find_subscription(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Active keys whose deactivation date is on or before `today`.
    async fn find_due_deactivations(&self, today: NaiveDate)
        -> Result<Vec<BillingKey>, DomainError>;
}

/// Transactional view of one subscriber's billing state.
#[async_trait]
pub trait BillingUnitOfWork: Send {
    fn subscriber_id(&self) -> &SubscriberId;

    async fn billing_key(&mut self) -> Result<Option<BillingKey>, DomainError>;

    /// Inserts or overwrites the subscriber's billing key.
    async fn save_billing_key(&mut self, key: &BillingKey) -> Result<(), DomainError>;

    async fn subscription(&mut self) -> Result<Option<Subscription>, DomainError>;

    /// Inserts or overwrites the subscriber's subscription.
    async fn save_subscription(&mut self, subscription: &Subscription)
        -> Result<(), DomainError>;

    /// All ledger entries currently owned by the subscriber.
    async fn entries(&mut self) -> Result<Vec<LedgerEntry>, DomainError>;

    async fn entry_by_order_id(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// Adds a new ledger entry. Fails with `DuplicateOrderId` on conflict.
    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError>;

    /// Rewrites an existing entry, matched by id.
    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError>;

    /// Makes all writes visible and releases the lock.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}
