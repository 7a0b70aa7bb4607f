//! Application layer - use cases over the billing domain.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Commands mutate one subscriber inside a unit of work; queries read
//! committed state.

pub mod billing;

pub use billing::{
    BillingPolicy, BillingServices, ChangeCardCommand, SubscribeCommand, WebhookCommand,
};
