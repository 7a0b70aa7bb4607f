//! Wiring of the billing use cases over a set of ports.

use std::sync::Arc;

use crate::ports::{BillingStore, PaymentGateway, SubscriberDirectory};

use super::{
    BillingKeyManager, BillingPolicy, DeactivationSweeper, GetCardInfoHandler,
    GetPaymentHistoryHandler, GetSubscriptionHandler, ScheduleReconciler, SubscriptionManager,
    WebhookProcessor,
};

/// All billing use cases, sharing one reconciler and key manager.
#[derive(Clone)]
pub struct BillingServices {
    pub subscriptions: Arc<SubscriptionManager>,
    pub webhooks: Arc<WebhookProcessor>,
    pub sweeper: Arc<DeactivationSweeper>,
    pub subscription: Arc<GetSubscriptionHandler>,
    pub payment_history: Arc<GetPaymentHistoryHandler>,
    pub card_info: Arc<GetCardInfoHandler>,
}

impl BillingServices {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        directory: Arc<dyn SubscriberDirectory>,
        policy: BillingPolicy,
    ) -> Self {
        let reconciler = Arc::new(ScheduleReconciler::new(
            gateway.clone(),
            directory,
            policy.clone(),
        ));
        let keys = Arc::new(BillingKeyManager::new(gateway.clone(), reconciler.clone()));

        Self {
            subscriptions: Arc::new(SubscriptionManager::new(
                store.clone(),
                gateway.clone(),
                keys.clone(),
                reconciler.clone(),
                policy.clone(),
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                store.clone(),
                gateway.clone(),
                reconciler,
                policy,
            )),
            sweeper: Arc::new(DeactivationSweeper::new(store.clone(), gateway.clone(), keys)),
            subscription: Arc::new(GetSubscriptionHandler::new(store.clone(), gateway.clone())),
            payment_history: Arc::new(GetPaymentHistoryHandler::new(store.clone())),
            card_info: Arc::new(GetCardInfoHandler::new(store, gateway)),
        }
    }
}
