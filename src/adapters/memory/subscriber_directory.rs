//! In-memory subscriber directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, SubscriberId};
use crate::ports::{BuyerContact, SubscriberDirectory};

/// Contact book keyed by subscriber, filled by whoever owns the users.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriberDirectory {
    contacts: Arc<RwLock<HashMap<SubscriberId, BuyerContact>>>,
}

impl InMemorySubscriberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, subscriber: SubscriberId, contact: BuyerContact) {
        self.contacts.write().await.insert(subscriber, contact);
    }
}

#[async_trait]
impl SubscriberDirectory for InMemorySubscriberDirectory {
    async fn contact(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<BuyerContact>, DomainError> {
        Ok(self.contacts.read().await.get(subscriber).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_inserted_contact() {
        let directory = InMemorySubscriberDirectory::new();
        let sub = SubscriberId::new("alice").unwrap();
        let contact = BuyerContact {
            email: Some("alice@example.com".into()),
            name: Some("Alice".into()),
            phone: Some("010-1234-5678".into()),
        };

        directory.insert(sub.clone(), contact.clone()).await;

        assert_eq!(directory.contact(&sub).await.unwrap(), Some(contact));
    }

    #[tokio::test]
    async fn unknown_subscriber_has_no_contact() {
        let directory = InMemorySubscriberDirectory::new();
        let sub = SubscriberId::new("nobody").unwrap();
        assert!(directory.contact(&sub).await.unwrap().is_none());
    }
}
