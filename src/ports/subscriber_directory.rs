//! Read-only access to subscriber contact details.
//!
//! Owned by the user-management component. Billing only needs the buyer
//! details the gateway prints on scheduled charges.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriberId};

use super::BuyerContact;

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Contact details for a subscriber, `None` if the directory has none.
    async fn contact(&self, subscriber: &SubscriberId)
        -> Result<Option<BuyerContact>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_directory_is_object_safe() {
        fn _accepts_dyn(_directory: &dyn SubscriberDirectory) {}
    }
}
