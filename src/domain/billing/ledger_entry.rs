//! Ledger entries (payment history rows) and their status machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    BillingKeyId, LedgerEntryId, StateMachine, SubscriberId, Timestamp, ValidationError,
};

use super::{BillingError, OrderId};

/// Status of one real or projected charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Registered with the gateway, not yet charged.
    Scheduled,
    /// Charge completed.
    Paid,
    /// Schedule withdrawn before charging.
    Canceled,
    /// Local row whose remote schedule could not be confirmed during cancellation.
    /// Kept for manual reconciliation.
    ErrorSync,
    /// Gateway attempted the charge and it was declined.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Scheduled => "scheduled",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::ErrorSync => "error_sync",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PaymentStatus::Scheduled),
            "paid" => Ok(PaymentStatus::Paid),
            "canceled" | "cancelled" => Ok(PaymentStatus::Canceled),
            "error_sync" => Ok(PaymentStatus::ErrorSync),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Scheduled, Paid)
                | (Scheduled, Canceled)
                | (Scheduled, ErrorSync)
                | (Scheduled, Failed)
                // a drifted row may still be charged or settled by hand
                | (ErrorSync, Paid)
                | (ErrorSync, Failed)
                | (ErrorSync, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Scheduled => vec![Paid, Canceled, ErrorSync, Failed],
            ErrorSync => vec![Paid, Failed, Canceled],
            Paid | Canceled | Failed => vec![],
        }
    }
}

/// Outcome of applying a status to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    /// The entry was already in the requested terminal status.
    Unchanged,
}

/// One row of the payment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Cleared on anonymization.
    pub subscriber_id: Option<SubscriberId>,
    /// Cleared on anonymization. Never rewritten when the key is replaced.
    pub billing_key_id: Option<BillingKeyId>,
    /// Gateway payment reference, known once the charge is realized.
    pub payment_ref: Option<String>,
    pub order_id: OrderId,
    pub display_name: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub scheduled_at: Option<Timestamp>,
}

impl LedgerEntry {
    /// Row for a charge that already went through.
    pub fn immediate(
        subscriber_id: SubscriberId,
        billing_key_id: BillingKeyId,
        order_id: OrderId,
        payment_ref: impl Into<String>,
        display_name: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            subscriber_id: Some(subscriber_id),
            billing_key_id: Some(billing_key_id),
            payment_ref: Some(payment_ref.into()),
            order_id,
            display_name: display_name.into(),
            amount,
            status: PaymentStatus::Paid,
            created_at: Timestamp::now(),
            scheduled_at: None,
        }
    }

    /// Row mirroring a schedule the gateway confirmed.
    pub fn scheduled(
        subscriber_id: SubscriberId,
        billing_key_id: BillingKeyId,
        order_id: OrderId,
        scheduled_at: Timestamp,
        display_name: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            subscriber_id: Some(subscriber_id),
            billing_key_id: Some(billing_key_id),
            payment_ref: None,
            order_id,
            display_name: display_name.into(),
            amount,
            status: PaymentStatus::Scheduled,
            created_at: Timestamp::now(),
            scheduled_at: Some(scheduled_at),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == PaymentStatus::Scheduled
    }

    pub fn belongs_to_key(&self, key: &BillingKeyId) -> bool {
        self.billing_key_id.as_ref() == Some(key)
    }

    /// Moves the entry to `target`. Re-applying a terminal status the entry
    /// already holds is reported as [`StatusChange::Unchanged`].
    pub fn apply_status(
        &mut self,
        target: PaymentStatus,
        payment_ref: Option<&str>,
    ) -> Result<StatusChange, BillingError> {
        if self.status == target && self.status.is_terminal() {
            return Ok(StatusChange::Unchanged);
        }
        let current = self.status;
        self.status = current
            .transition_to(target)
            .map_err(|_| BillingError::invalid_transition(current.as_str(), target.as_str()))?;
        if let Some(reference) = payment_ref {
            self.payment_ref = Some(reference.to_string());
        }
        Ok(StatusChange::Applied)
    }

    /// Strips personal data and detaches the row from its owner.
    /// Status, amount and timestamps are kept for bookkeeping.
    pub fn anonymize(&mut self) {
        let label = self.id.short();
        self.payment_ref = Some(format!("deleted_{}_imp", label));
        self.order_id = OrderId::anonymized(&self.id);
        self.display_name = format!("deleted subscription {}", label);
        self.subscriber_id = None;
        self.billing_key_id = None;
    }
}
