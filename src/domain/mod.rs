//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, state machine, errors)
//! - `billing` - Billing keys, subscriptions, payment ledger and schedule planning

pub mod billing;
pub mod foundation;
