//! In-memory billing store.
//!
//! Each unit of work holds an owned async mutex for its subscriber and a
//! private copy of that subscriber's rows. Commit writes the copy back under
//! the global write lock after re-checking order-id uniqueness, so two
//! subscribers inserting the same order id concurrently can't both win.
//! Useful for tests and single-process development.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::billing::{BillingKey, LedgerEntry, OrderId, Subscription};
use crate::domain::foundation::{DomainError, ErrorCode, LedgerEntryId, SubscriberId};
use crate::ports::{BillingStore, BillingUnitOfWork};

#[derive(Debug, Default)]
struct StoreState {
    keys: HashMap<SubscriberId, BillingKey>,
    subscriptions: HashMap<SubscriberId, Subscription>,
    entries: HashMap<LedgerEntryId, LedgerEntry>,
}

/// In-memory implementation of [`BillingStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<RwLock<StoreState>>,
    locks: Arc<Mutex<HashMap<SubscriberId, Arc<Mutex<()>>>>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed entry, anonymized ones included.
    pub async fn all_entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<_> = self.state.read().await.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Committed subscription of a subscriber.
    pub async fn subscription_of(&self, subscriber: &SubscriberId) -> Option<Subscription> {
        self.state.read().await.subscriptions.get(subscriber).cloned()
    }

    async fn subscriber_lock(&self, subscriber: &SubscriberId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(subscriber.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

fn duplicate_order_id(order_id: &OrderId) -> DomainError {
    DomainError::new(
        ErrorCode::DuplicateOrderId,
        format!("order id {} already exists", order_id),
    )
    .with_detail("order_id", order_id.as_str())
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Box<dyn BillingUnitOfWork>, DomainError> {
        let guard = self.subscriber_lock(subscriber).await.lock_owned().await;

        let state = self.state.read().await;
        let entries = state
            .entries
            .values()
            .filter(|e| e.subscriber_id.as_ref() == Some(subscriber))
            .map(|e| (e.id, e.clone()))
            .collect();

        Ok(Box::new(InMemoryUnitOfWork {
            subscriber: subscriber.clone(),
            _guard: guard,
            state: Arc::clone(&self.state),
            key: state.keys.get(subscriber).cloned(),
            subscription: state.subscriptions.get(subscriber).cloned(),
            entries,
            key_dirty: false,
            subscription_dirty: false,
            touched: HashSet::new(),
        }))
    }

    async fn find_entry_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .find(|e| &e.order_id == order_id)
            .cloned())
    }

    async fn list_entries(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .entries
            .values()
            .filter(|e| e.subscriber_id.as_ref() == Some(subscriber))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn find_billing_key(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<BillingKey>, DomainError> {
        Ok(self.state.read().await.keys.get(subscriber).cloned())
    }

    async fn find_subscription(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscription_of(subscriber).await)
    }

    async fn find_due_deactivations(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BillingKey>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .values()
            .filter(|k| k.is_due_for_deactivation(today))
            .cloned()
            .collect())
    }
}

/// Unit of work over one subscriber's rows.
struct InMemoryUnitOfWork {
    subscriber: SubscriberId,
    _guard: OwnedMutexGuard<()>,
    state: Arc<RwLock<StoreState>>,
    key: Option<BillingKey>,
    subscription: Option<Subscription>,
    entries: HashMap<LedgerEntryId, LedgerEntry>,
    key_dirty: bool,
    subscription_dirty: bool,
    touched: HashSet<LedgerEntryId>,
}

impl InMemoryUnitOfWork {
    fn owned(&self, entry: &LedgerEntry) -> bool {
        entry.subscriber_id.as_ref() == Some(&self.subscriber)
    }

    /// True if some row outside this unit of work already uses `order_id`.
    fn taken_elsewhere(&self, state: &StoreState, entry: &LedgerEntry) -> bool {
        state
            .entries
            .values()
            .any(|e| e.order_id == entry.order_id && !self.entries.contains_key(&e.id))
    }
}

#[async_trait]
impl BillingUnitOfWork for InMemoryUnitOfWork {
    fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber
    }

    async fn billing_key(&mut self) -> Result<Option<BillingKey>, DomainError> {
        Ok(self.key.clone())
    }

    async fn save_billing_key(&mut self, key: &BillingKey) -> Result<(), DomainError> {
        if key.subscriber_id != self.subscriber {
            return Err(DomainError::validation(
                "subscriber_id",
                "billing key belongs to another subscriber",
            ));
        }
        self.key = Some(key.clone());
        self.key_dirty = true;
        Ok(())
    }

    async fn subscription(&mut self) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscription.clone())
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        if subscription.subscriber_id != self.subscriber {
            return Err(DomainError::validation(
                "subscriber_id",
                "subscription belongs to another subscriber",
            ));
        }
        self.subscription = Some(subscription.clone());
        self.subscription_dirty = true;
        Ok(())
    }

    async fn entries(&mut self) -> Result<Vec<LedgerEntry>, DomainError> {
        let mut entries: Vec<_> = self
            .entries
            .values()
            .filter(|e| self.owned(e))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn entry_by_order_id(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self
            .entries
            .values()
            .find(|e| self.owned(e) && &e.order_id == order_id)
            .cloned())
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError> {
        if self.entries.contains_key(&entry.id) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                format!("ledger entry {} already exists", entry.id),
            ));
        }
        if self.entries.values().any(|e| e.order_id == entry.order_id) {
            return Err(duplicate_order_id(&entry.order_id));
        }
        {
            let state = self.state.read().await;
            if self.taken_elsewhere(&state, entry) {
                return Err(duplicate_order_id(&entry.order_id));
            }
        }
        self.entries.insert(entry.id, entry.clone());
        self.touched.insert(entry.id);
        Ok(())
    }

    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError> {
        let Some(existing) = self.entries.get_mut(&entry.id) else {
            return Err(DomainError::new(
                ErrorCode::LedgerEntryNotFound,
                format!("ledger entry {} not found", entry.id),
            ));
        };
        *existing = entry.clone();
        self.touched.insert(entry.id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let mut state = self.state.write().await;

        for id in &self.touched {
            if let Some(entry) = self.entries.get(id) {
                if self.taken_elsewhere(&state, entry) {
                    return Err(duplicate_order_id(&entry.order_id));
                }
            }
        }

        if self.key_dirty {
            if let Some(key) = &self.key {
                state.keys.insert(self.subscriber.clone(), key.clone());
            }
        }
        if self.subscription_dirty {
            if let Some(subscription) = &self.subscription {
                state
                    .subscriptions
                    .insert(self.subscriber.clone(), subscription.clone());
            }
        }
        for id in &self.touched {
            if let Some(entry) = self.entries.get(id) {
                state.entries.insert(*id, entry.clone());
            }
        }
        Ok(())
    }
}
