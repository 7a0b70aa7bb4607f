//! Subscription Billing - reconciliation core for recurring card payments.
//!
//! Keeps three sources of truth consistent: the local subscription and
//! billing-key state, the local payment ledger, and the schedules registered
//! with the remote payment gateway. Card changes, cancellations, webhook
//! callbacks and the daily deactivation sweep all go through per-subscriber
//! units of work.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod runtime;
