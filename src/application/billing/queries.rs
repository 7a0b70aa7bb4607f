//! Read-side billing queries.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::billing::{
    mask_card_number, BillingError, BillingKey, LedgerEntry, PlanCode, SubscriptionState,
    NO_CARD_INFO, UNKNOWN_BANK,
};
use crate::domain::foundation::{SubscriberId, Timestamp};
use crate::ports::{BillingStore, CardInfo, GatewayError, PaymentGateway};

/// Handler for listing a subscriber's payment history.
pub struct GetPaymentHistoryHandler {
    store: Arc<dyn BillingStore>,
}

impl GetPaymentHistoryHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Ledger rows of the subscriber, newest first.
    pub async fn handle(&self, subscriber: &SubscriberId) -> Result<Vec<LedgerEntry>, BillingError> {
        Ok(self.store.list_entries(subscriber).await?)
    }
}

/// Card summary safe to show the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardInfoView {
    pub card_name: String,
    pub card_number: String,
}

impl CardInfoView {
    pub fn unknown() -> Self {
        Self {
            card_name: UNKNOWN_BANK.to_string(),
            card_number: NO_CARD_INFO.to_string(),
        }
    }
}

/// Handler for the card behind a subscriber's billing key.
///
/// Gateway trouble degrades to [`CardInfoView::unknown`]; only storage
/// failures are errors.
pub struct GetCardInfoHandler {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GetCardInfoHandler {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn handle(&self, subscriber: &SubscriberId) -> Result<CardInfoView, BillingError> {
        let key = self.store.find_billing_key(subscriber).await?;
        Ok(card_view(self.gateway.as_ref(), key.as_ref()).await)
    }
}

/// Subscription as the subscriber sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    pub plan: PlanCode,
    pub state: SubscriptionState,
    pub is_active: bool,
    pub next_billing_date: Timestamp,
    /// Last day of service while a cancellation is pending.
    pub deactivation_date: Option<NaiveDate>,
    pub card: CardInfoView,
}

/// Handler for reading a subscriber's subscription with its card.
pub struct GetSubscriptionHandler {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GetSubscriptionHandler {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Fails with `NotSubscribed` when the subscriber never subscribed.
    pub async fn handle(&self, subscriber: &SubscriberId) -> Result<SubscriptionView, BillingError> {
        let subscription = self
            .store
            .find_subscription(subscriber)
            .await?
            .ok_or_else(|| BillingError::NotSubscribed(subscriber.clone()))?;
        let key = self.store.find_billing_key(subscriber).await?;

        let state = SubscriptionState::derive(Some(&subscription), key.as_ref());
        let card = card_view(self.gateway.as_ref(), key.as_ref()).await;

        Ok(SubscriptionView {
            plan: subscription.plan,
            state,
            is_active: subscription.is_active,
            next_billing_date: subscription.next_billing_date,
            deactivation_date: key.and_then(|k| k.deactivation_date),
            card,
        })
    }
}

/// Card of an active key. Anything else, gateway trouble included, is
/// [`CardInfoView::unknown`].
async fn card_view(gateway: &dyn PaymentGateway, key: Option<&BillingKey>) -> CardInfoView {
    let key = match key {
        Some(key) if key.is_active => key,
        _ => return CardInfoView::unknown(),
    };

    match lookup_card(gateway, &key.customer_ref).await {
        Ok(Some(card)) => CardInfoView {
            card_name: card.card_name.unwrap_or_else(|| UNKNOWN_BANK.to_string()),
            card_number: card
                .card_number
                .as_deref()
                .map(mask_card_number)
                .unwrap_or_else(|| NO_CARD_INFO.to_string()),
        },
        Ok(None) => CardInfoView::unknown(),
        Err(e) => {
            tracing::warn!(
                subscriber_id = %key.subscriber_id,
                customer_ref = %key.customer_ref,
                error = %e,
                "Card lookup failed"
            );
            CardInfoView::unknown()
        }
    }
}

async fn lookup_card(
    gateway: &dyn PaymentGateway,
    customer_ref: &str,
) -> Result<Option<CardInfo>, GatewayError> {
    let token = gateway.fetch_access_token().await?;
    gateway.fetch_customer_card(customer_ref, &token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::portone::MockPaymentGateway;
    use crate::domain::billing::Subscription;

    async fn store_with_key(subscriber: &SubscriberId) -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        let mut uow = store.begin(subscriber).await.unwrap();
        uow.save_billing_key(&BillingKey::new(
            subscriber.clone(),
            "customer_alice",
            PlanCode::Basic,
            9_900,
        ))
        .await
        .unwrap();
        uow.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn card_number_is_masked() {
        let alice = SubscriberId::new("alice").unwrap();
        let store = store_with_key(&alice).await;
        let gateway = MockPaymentGateway::new();
        gateway.set_card("customer_alice", "Shinhan", "5365102312341234");
        let handler = GetCardInfoHandler::new(Arc::new(store), Arc::new(gateway));

        let view = handler.handle(&alice).await.unwrap();

        assert_eq!(view.card_name, "Shinhan");
        assert_eq!(view.card_number, "5365-****-****-****");
    }

    #[tokio::test]
    async fn gateway_failure_degrades_to_unknown() {
        let alice = SubscriberId::new("alice").unwrap();
        let store = store_with_key(&alice).await;
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("fetch_customer_card", GatewayError::timeout("slow"));
        let handler = GetCardInfoHandler::new(Arc::new(store), Arc::new(gateway));

        let view = handler.handle(&alice).await.unwrap();
        assert_eq!(view, CardInfoView::unknown());
    }

    #[tokio::test]
    async fn missing_key_is_unknown_without_gateway_call() {
        let gateway = MockPaymentGateway::new();
        let handler = GetCardInfoHandler::new(
            Arc::new(InMemoryBillingStore::new()),
            Arc::new(gateway.clone()),
        );

        let view = handler
            .handle(&SubscriberId::new("nobody").unwrap())
            .await
            .unwrap();

        assert_eq!(view.card_name, UNKNOWN_BANK);
        assert_eq!(view.card_number, NO_CARD_INFO);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn subscription_view_reports_pending_cancellation() {
        let alice = SubscriberId::new("alice").unwrap();
        let store = store_with_key(&alice).await;
        let next = Timestamp::now().add_months(1);
        {
            let mut uow = store.begin(&alice).await.unwrap();
            let mut key = uow.billing_key().await.unwrap().unwrap();
            key.request_deactivation(next.date()).unwrap();
            uow.save_billing_key(&key).await.unwrap();
            uow.save_subscription(&Subscription::new(alice.clone(), PlanCode::Basic, next))
                .await
                .unwrap();
            uow.commit().await.unwrap();
        }
        let gateway = MockPaymentGateway::new();
        gateway.set_card("customer_alice", "Shinhan", "5365102312341234");
        let handler = GetSubscriptionHandler::new(Arc::new(store), Arc::new(gateway));

        let view = handler.handle(&alice).await.unwrap();

        assert_eq!(view.plan, PlanCode::Basic);
        assert_eq!(view.state, SubscriptionState::CancelPending);
        assert!(view.is_active);
        assert_eq!(view.next_billing_date, next);
        assert_eq!(view.deactivation_date, Some(next.date()));
        assert_eq!(view.card.card_number, "5365-****-****-****");
    }

    #[tokio::test]
    async fn subscription_view_requires_a_subscription() {
        let alice = SubscriberId::new("alice").unwrap();
        let store = store_with_key(&alice).await;
        let handler = GetSubscriptionHandler::new(
            Arc::new(store),
            Arc::new(MockPaymentGateway::new()),
        );

        let err = handler.handle(&alice).await.unwrap_err();
        assert!(matches!(err, BillingError::NotSubscribed(_)));
    }

    #[tokio::test]
    async fn history_is_empty_for_new_subscriber() {
        let handler = GetPaymentHistoryHandler::new(Arc::new(InMemoryBillingStore::new()));
        let rows = handler
            .handle(&SubscriberId::new("nobody").unwrap())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
