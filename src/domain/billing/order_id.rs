//! Merchant order id, the idempotency key of the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{LedgerEntryId, SubscriberId, ValidationError};

const SCHEDULED_PREFIX: &str = "scheduled_";

/// Merchant-side order identifier. Unique across the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::empty_field("order_id"));
        }
        Ok(Self(value))
    }

    /// Order id for a gateway-scheduled charge:
    /// `scheduled_{subscriber}_{unix_millis}_{seq}`.
    pub fn scheduled(subscriber: &SubscriberId, unix_millis: i64, seq: u64) -> Self {
        Self(format!(
            "{}{}_{}_{}",
            SCHEDULED_PREFIX,
            subscriber.as_str(),
            unix_millis,
            seq
        ))
    }

    /// Replacement id for an anonymized entry. Derived from the entry id so
    /// it stays unique.
    pub fn anonymized(entry: &LedgerEntryId) -> Self {
        Self(format!("deleted_{}_merchant", entry))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_scheduled(&self) -> bool {
        self.0.starts_with(SCHEDULED_PREFIX)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
