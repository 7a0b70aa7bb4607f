//! Mock payment gateway for testing.
//!
//! Keeps a remote "schedule book" per customer reference so tests can
//! observe what the gateway holds, and supports:
//! - Pre-registered payments and cards
//! - Batch and unschedule refusals, error injection per method
//! - Simulated drift (remote schedules that vanished)
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::billing::OrderId;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AccessToken, CardInfo, GatewayError, GatewayResult, PaymentGateway, PaymentRecord,
    RemotePaymentStatus, ScheduleRequest, ScheduledCharge,
};

const MOCK_TOKEN: &str = "mock-access-token";

/// Mock payment gateway.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.add_paid_payment("imp_1", "order_1", 9_900);
/// gateway.set_card("customer_1", "Shinhan", "5365-10**-****-1234");
/// gateway.reject_next_registration("card expired");
/// ```
#[derive(Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    payments: HashMap<String, PaymentRecord>,
    cards: HashMap<String, CardInfo>,

    /// Pending schedules per customer reference.
    schedules: HashMap<String, Vec<ScheduledCharge>>,

    /// Result to return (once) instead of booking the next batch.
    next_register_result: Option<GatewayResult>,

    /// Result to return (once) instead of clearing the book on unschedule.
    next_cancel_result: Option<GatewayResult>,

    /// Echo confirmed schedules in reverse order.
    echo_reversed: bool,

    next_error: Option<GatewayError>,
    method_errors: HashMap<String, GatewayError>,
    customer_errors: HashMap<String, GatewayError>,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_payment(&self, record: PaymentRecord) {
        self.state()
            .payments
            .insert(record.payment_ref.clone(), record);
    }

    /// Registers a completed payment the gateway will confirm.
    pub fn add_paid_payment(&self, payment_ref: &str, order_id: &str, amount: i64) {
        self.add_payment(PaymentRecord {
            payment_ref: payment_ref.to_string(),
            order_id: order_id.to_string(),
            amount,
            status: RemotePaymentStatus::Paid,
            customer_ref: None,
            paid_at: Some(Timestamp::now()),
        });
    }

    pub fn set_card(&self, customer_ref: &str, card_name: &str, card_number: &str) {
        self.state().cards.insert(
            customer_ref.to_string(),
            CardInfo {
                card_name: Some(card_name.to_string()),
                card_number: Some(card_number.to_string()),
            },
        );
    }

    /// Makes the next `register_schedules` call return an overall failure.
    pub fn reject_next_registration(&self, message: &str) {
        self.state().next_register_result = Some(GatewayResult::rejected(message));
    }

    /// Makes the next `register_schedules` call return `result` verbatim.
    pub fn set_next_register_result(&self, result: GatewayResult) {
        self.state().next_register_result = Some(result);
    }

    /// Makes the next `cancel_schedules` call refuse and keep the remote book.
    pub fn refuse_next_unschedule(&self, message: &str) {
        self.state().next_cancel_result = Some(GatewayResult::rejected(message));
    }

    pub fn echo_schedules_reversed(&self, reversed: bool) {
        self.state().echo_reversed = reversed;
    }

    /// Drops a schedule from the remote book, as if the gateway lost it.
    pub fn forget_schedule(&self, customer_ref: &str, order_id: &OrderId) {
        if let Some(book) = self.state().schedules.get_mut(customer_ref) {
            book.retain(|s| &s.order_id != order_id);
        }
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method until cleared.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Fail every call made for one customer reference until cleared.
    pub fn fail_customer(&self, customer_ref: &str, error: GatewayError) {
        self.state()
            .customer_errors
            .insert(customer_ref.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
        state.customer_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Schedules the gateway currently holds for a customer reference.
    pub fn scheduled_for(&self, customer_ref: &str) -> Vec<ScheduledCharge> {
        self.state()
            .schedules
            .get(customer_ref)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn check_customer(&self, customer_ref: &str) -> Result<(), GatewayError> {
        match self.state().customer_errors.get(customer_ref) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_token(token: &AccessToken) -> Result<(), GatewayError> {
        if token.expose() == MOCK_TOKEN {
            Ok(())
        } else {
            Err(GatewayError::authentication("unknown access token"))
        }
    }
}

impl Clone for MockPaymentGateway {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn fetch_access_token(&self) -> Result<AccessToken, GatewayError> {
        self.record_call("fetch_access_token", vec![]);
        self.check_error("fetch_access_token")?;
        Ok(AccessToken::new(MOCK_TOKEN))
    }

    async fn verify_payment(
        &self,
        payment_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<PaymentRecord>, GatewayError> {
        self.record_call("verify_payment", vec![payment_ref.to_string()]);
        self.check_error("verify_payment")?;
        Self::check_token(token)?;
        Ok(self.state().payments.get(payment_ref).cloned())
    }

    async fn register_schedules(
        &self,
        customer_ref: &str,
        requests: &[ScheduleRequest],
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError> {
        self.record_call(
            "register_schedules",
            vec![customer_ref.to_string(), requests.len().to_string()],
        );
        self.check_error("register_schedules")?;
        self.check_customer(customer_ref)?;
        Self::check_token(token)?;

        let mut state = self.state();
        if let Some(result) = state.next_register_result.take() {
            if result.success {
                state
                    .schedules
                    .entry(customer_ref.to_string())
                    .or_default()
                    .extend(result.entries.iter().cloned());
            }
            return Ok(result);
        }

        let book = state.schedules.entry(customer_ref.to_string()).or_default();
        if let Some(dup) = requests
            .iter()
            .find(|r| book.iter().any(|s| s.order_id == r.order_id))
        {
            return Ok(GatewayResult::rejected(format!(
                "merchant_uid {} already scheduled",
                dup.order_id
            )));
        }

        let mut confirmed: Vec<ScheduledCharge> = requests
            .iter()
            .map(|r| ScheduledCharge {
                order_id: r.order_id.clone(),
                charge_at: r.charge_at,
            })
            .collect();
        book.extend(confirmed.iter().cloned());

        if state.echo_reversed {
            confirmed.reverse();
        }
        Ok(GatewayResult::confirmed(confirmed))
    }

    async fn cancel_schedules(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError> {
        self.record_call("cancel_schedules", vec![customer_ref.to_string()]);
        self.check_error("cancel_schedules")?;
        self.check_customer(customer_ref)?;
        Self::check_token(token)?;

        let mut state = self.state();
        if let Some(result) = state.next_cancel_result.take() {
            return Ok(result);
        }
        let withdrawn = state.schedules.remove(customer_ref).unwrap_or_default();
        if withdrawn.is_empty() {
            return Ok(GatewayResult::nothing_scheduled(
                "no scheduled payments to cancel",
            ));
        }
        Ok(GatewayResult::confirmed(withdrawn))
    }

    async fn fetch_customer_card(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<CardInfo>, GatewayError> {
        self.record_call("fetch_customer_card", vec![customer_ref.to_string()]);
        self.check_error("fetch_customer_card")?;
        self.check_customer(customer_ref)?;
        Self::check_token(token)?;
        Ok(self.state().cards.get(customer_ref).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BuyerContact;

    fn request(order: &str) -> ScheduleRequest {
        ScheduleRequest {
            order_id: OrderId::new(order).unwrap(),
            charge_at: Timestamp::now().add_months(1),
            amount: 9_900,
            display_name: "BASIC subscription".into(),
            buyer: BuyerContact::default(),
        }
    }

    #[tokio::test]
    async fn registered_schedules_are_booked_and_cancelled() {
        let gateway = MockPaymentGateway::new();
        let token = gateway.fetch_access_token().await.unwrap();

        let result = gateway
            .register_schedules("cust", &[request("a"), request("b")], &token)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(gateway.scheduled_for("cust").len(), 2);

        let cancelled = gateway.cancel_schedules("cust", &token).await.unwrap();
        assert_eq!(cancelled.entries.len(), 2);
        assert!(gateway.scheduled_for("cust").is_empty());
    }

    #[tokio::test]
    async fn cancel_with_empty_book_is_rejected() {
        let gateway = MockPaymentGateway::new();
        let token = gateway.fetch_access_token().await.unwrap();
        let result = gateway.cancel_schedules("cust", &token).await.unwrap();
        assert!(!result.success);
        assert!(result.is_nothing_scheduled());
    }

    #[tokio::test]
    async fn refused_unschedule_keeps_remote_book() {
        let gateway = MockPaymentGateway::new();
        let token = gateway.fetch_access_token().await.unwrap();
        gateway
            .register_schedules("cust", &[request("a")], &token)
            .await
            .unwrap();
        gateway.refuse_next_unschedule("merchant not authorized");

        let result = gateway.cancel_schedules("cust", &token).await.unwrap();

        assert!(!result.success);
        assert!(!result.is_nothing_scheduled());
        assert_eq!(gateway.scheduled_for("cust").len(), 1);
    }

    #[tokio::test]
    async fn duplicate_order_ids_are_rejected() {
        let gateway = MockPaymentGateway::new();
        let token = gateway.fetch_access_token().await.unwrap();
        gateway
            .register_schedules("cust", &[request("a")], &token)
            .await
            .unwrap();
        let result = gateway
            .register_schedules("cust", &[request("a")], &token)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(gateway.scheduled_for("cust").len(), 1);
    }

    #[tokio::test]
    async fn method_error_is_returned_until_cleared() {
        let gateway = MockPaymentGateway::new();
        gateway.set_method_error("fetch_access_token", GatewayError::timeout("slow"));
        assert!(gateway.fetch_access_token().await.is_err());
        assert!(gateway.fetch_access_token().await.is_err());
        gateway.clear_errors();
        assert!(gateway.fetch_access_token().await.is_ok());
        assert_eq!(gateway.call_count("fetch_access_token"), 3);
    }

    #[tokio::test]
    async fn foreign_token_is_refused() {
        let gateway = MockPaymentGateway::new();
        let err = gateway
            .verify_payment("imp_1", &AccessToken::new("stolen"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::ports::GatewayErrorCode::Authentication);
    }
}
