//! Billing domain - billing keys, subscriptions and the payment ledger.
//!
//! # Module Structure
//!
//! - `billing_key` - Gateway credential per subscriber and its deferred deactivation
//! - `subscription` - Subscription row and derived lifecycle state
//! - `ledger_entry` - Payment history rows and their status machine
//! - `order_id` - Merchant order id (ledger idempotency key)
//! - `plan` - Plan codes and price table
//! - `schedule` - Monthly charge date planning
//! - `card_mask` - Card number masking for display
//! - `errors` - Billing use-case errors

mod billing_key;
mod card_mask;
mod errors;
mod ledger_entry;
mod order_id;
mod plan;
mod schedule;
mod subscription;

pub use billing_key::BillingKey;
pub use card_mask::{mask_card_number, NO_CARD_INFO, UNKNOWN_BANK};
pub use errors::BillingError;
pub use ledger_entry::{LedgerEntry, PaymentStatus, StatusChange};
pub use order_id::OrderId;
pub use plan::{PlanCode, PlanPrices};
pub use schedule::{charge_dates, fallback_next_billing_date, schedule_base, BILLING_PERIOD_MONTHS};
pub use subscription::{Subscription, SubscriptionState};
