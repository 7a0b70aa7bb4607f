//! PortOne (iamport v1 REST) payment gateway adapter.
//!
//! Implements the `PaymentGateway` port over the iamport REST API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | token | `POST /users/getToken` |
//! | verify payment | `GET /payments/{imp_uid}` |
//! | register schedules | `POST /subscribe/payments/schedule` |
//! | cancel schedules | `POST /subscribe/payments/unschedule` |
//! | customer card | `GET /subscribe/customers/{customer_uid}` |
//!
//! Every response is wrapped in `{code, message, response}`; `code == 0` is
//! success. A non-zero code is the gateway answering "no", which the schedule
//! calls surface as `GatewayResult { success: false, .. }`.
//!
//! # Configuration
//!
//! ```ignore
//! let config = PortOneConfig::new(imp_key, imp_secret).with_timeout(Duration::from_secs(10));
//! let gateway = PortOneGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::billing::OrderId;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AccessToken, CardInfo, GatewayError, GatewayErrorCode, GatewayResult, PaymentGateway,
    PaymentRecord, RemotePaymentStatus, ScheduleRequest, ScheduledCharge,
};

const DEFAULT_BASE_URL: &str = "https://api.iamport.kr";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Fragment of PortOne's "no schedules to cancel" message.
const NOTHING_SCHEDULED_MARKER: &str = "존재하지 않";

/// PortOne API configuration.
#[derive(Clone)]
pub struct PortOneConfig {
    imp_key: String,
    imp_secret: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl PortOneConfig {
    pub fn new(imp_key: impl Into<String>, imp_secret: SecretString) -> Self {
        Self {
            imp_key: imp_key.into(),
            imp_secret,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout. Applies to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for PortOneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortOneConfig")
            .field("imp_key", &self.imp_key)
            .field("imp_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// PortOne gateway adapter.
pub struct PortOneGateway {
    config: PortOneConfig,
    http_client: reqwest::Client,
}

impl PortOneGateway {
    pub fn new(config: PortOneConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Sends a request and unwraps the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<Reply<T>, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        match status {
            StatusCode::NOT_FOUND => return Ok(Reply::NotFound),
            StatusCode::UNAUTHORIZED => {
                return Err(GatewayError::authentication(format!(
                    "{} refused the access token",
                    operation
                )))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(GatewayError::new(
                    GatewayErrorCode::RateLimited,
                    format!("{} rate limited", operation),
                ))
            }
            _ => {}
        }

        let body = response.text().await.map_err(transport_error)?;
        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                tracing::error!(operation, error = %e, "Unparseable PortOne response");
                return Err(GatewayError::malformed(format!(
                    "{}: unexpected response body: {}",
                    operation, e
                )));
            }
            Err(_) => {
                tracing::error!(operation, status = status.as_u16(), "PortOne call failed");
                return Err(GatewayError::provider(format!(
                    "{} failed with HTTP {}",
                    operation,
                    status.as_u16()
                )));
            }
        };

        envelope.into_reply(operation)
    }
}

#[async_trait]
impl PaymentGateway for PortOneGateway {
    async fn fetch_access_token(&self) -> Result<AccessToken, GatewayError> {
        let request = self.http_client.post(self.url("/users/getToken")).json(&TokenRequest {
            imp_key: &self.config.imp_key,
            imp_secret: self.config.imp_secret.expose_secret(),
        });

        match self.send::<TokenResponse>(request, "getToken").await? {
            Reply::Success(token) => Ok(AccessToken::new(token.access_token)),
            Reply::Rejected { message, .. } => {
                tracing::error!(message = %message, "PortOne refused credentials");
                Err(GatewayError::authentication(message))
            }
            Reply::NotFound => Err(GatewayError::authentication("token endpoint not found")),
        }
    }

    async fn verify_payment(
        &self,
        payment_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<PaymentRecord>, GatewayError> {
        let request = self
            .http_client
            .get(self.url(&format!("/payments/{}", payment_ref)))
            .header(reqwest::header::AUTHORIZATION, token.expose());

        match self.send::<PaymentResponse>(request, "payments").await? {
            Reply::Success(payment) => Ok(Some(payment.into_record())),
            Reply::NotFound => Ok(None),
            Reply::Rejected { code, message } => {
                Err(GatewayError::provider(message).with_provider_code(code.to_string()))
            }
        }
    }

    async fn register_schedules(
        &self,
        customer_ref: &str,
        requests: &[ScheduleRequest],
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError> {
        let body = ScheduleBatchRequest {
            customer_uid: customer_ref,
            schedules: requests.iter().map(ScheduleItem::from_request).collect(),
        };
        let request = self
            .http_client
            .post(self.url("/subscribe/payments/schedule"))
            .header(reqwest::header::AUTHORIZATION, token.expose())
            .json(&body);

        tracing::debug!(customer_ref, count = requests.len(), "Registering schedules");

        match self
            .send::<Vec<ScheduleResponse>>(request, "schedule")
            .await?
        {
            Reply::Success(entries) => Ok(GatewayResult::confirmed(
                entries
                    .into_iter()
                    .map(ScheduleResponse::into_charge)
                    .collect::<Result<_, _>>()?,
            )),
            Reply::Rejected { message, .. } => Ok(GatewayResult::rejected(message)),
            Reply::NotFound => Ok(GatewayResult::rejected(format!(
                "customer {} not found",
                customer_ref
            ))),
        }
    }

    async fn cancel_schedules(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<GatewayResult, GatewayError> {
        let request = self
            .http_client
            .post(self.url("/subscribe/payments/unschedule"))
            .header(reqwest::header::AUTHORIZATION, token.expose())
            .json(&UnscheduleRequest {
                customer_uid: customer_ref,
            });

        match self
            .send::<Vec<ScheduleResponse>>(request, "unschedule")
            .await?
        {
            Reply::Success(entries) => Ok(GatewayResult::confirmed(
                entries
                    .into_iter()
                    .map(ScheduleResponse::into_charge)
                    .collect::<Result<_, _>>()?,
            )),
            Reply::Rejected { code, message } => Ok(unschedule_rejection(code, message)),
            Reply::NotFound => Ok(GatewayResult::nothing_scheduled(format!(
                "no schedules for customer {}",
                customer_ref
            ))),
        }
    }

    async fn fetch_customer_card(
        &self,
        customer_ref: &str,
        token: &AccessToken,
    ) -> Result<Option<CardInfo>, GatewayError> {
        let request = self
            .http_client
            .get(self.url(&format!("/subscribe/customers/{}", customer_ref)))
            .header(reqwest::header::AUTHORIZATION, token.expose());

        match self.send::<CustomerResponse>(request, "customers").await? {
            Reply::Success(customer) => Ok(Some(CardInfo {
                card_name: customer.card_name,
                card_number: customer.card_number,
            })),
            Reply::NotFound => Ok(None),
            Reply::Rejected { message, .. } => {
                tracing::debug!(customer_ref, message = %message, "Customer lookup rejected");
                Ok(None)
            }
        }
    }
}

/// PortOne answers an unschedule with nothing pending with a non-zero code
/// and a "does not exist" message. Every other refusal must abort.
fn unschedule_rejection(code: i64, message: String) -> GatewayResult {
    let lower = message.to_lowercase();
    let nothing_pending = message.contains(NOTHING_SCHEDULED_MARKER)
        || lower.contains("not exist")
        || lower.contains("no schedule");
    if nothing_pending {
        GatewayResult::nothing_scheduled(message)
    } else {
        tracing::warn!(code, message = %message, "PortOne refused unschedule");
        GatewayResult::rejected(message)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::timeout(e.to_string())
    } else {
        GatewayError::network(e.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════

/// Unwrapped envelope.
#[derive(Debug)]
enum Reply<T> {
    Success(T),
    /// Gateway answered with a non-zero code.
    Rejected { code: i64, message: String },
    NotFound,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    message: Option<String>,
    response: Option<T>,
}

impl<T> Envelope<T> {
    fn into_reply(self, operation: &str) -> Result<Reply<T>, GatewayError> {
        if self.code != 0 {
            let message = self
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("{} failed with code {}", operation, self.code));
            return Ok(Reply::Rejected {
                code: self.code,
                message,
            });
        }
        self.response.map(Reply::Success).ok_or_else(|| {
            GatewayError::malformed(format!("{}: success without response body", operation))
        })
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    imp_key: &'a str,
    imp_secret: &'a str,
}

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug))]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    imp_uid: String,
    merchant_uid: String,
    amount: i64,
    status: RemotePaymentStatus,
    customer_uid: Option<String>,
    #[serde(default)]
    paid_at: i64,
}

impl PaymentResponse {
    fn into_record(self) -> PaymentRecord {
        PaymentRecord {
            payment_ref: self.imp_uid,
            order_id: self.merchant_uid,
            amount: self.amount,
            status: self.status,
            customer_ref: self.customer_uid,
            // 0 means "not paid yet"
            paid_at: Some(self.paid_at)
                .filter(|secs| *secs > 0)
                .and_then(Timestamp::from_unix_secs),
        }
    }
}

#[derive(Serialize)]
struct ScheduleBatchRequest<'a> {
    customer_uid: &'a str,
    schedules: Vec<ScheduleItem<'a>>,
}

#[derive(Debug, Serialize)]
struct ScheduleItem<'a> {
    merchant_uid: &'a str,
    schedule_at: i64,
    amount: i64,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_tel: Option<&'a str>,
}

impl<'a> ScheduleItem<'a> {
    fn from_request(request: &'a ScheduleRequest) -> Self {
        Self {
            merchant_uid: request.order_id.as_str(),
            schedule_at: request.charge_at.as_unix_secs(),
            amount: request.amount,
            name: &request.display_name,
            buyer_name: request.buyer.name.as_deref(),
            buyer_email: request.buyer.email.as_deref(),
            buyer_tel: request.buyer.phone.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct UnscheduleRequest<'a> {
    customer_uid: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    merchant_uid: String,
    schedule_at: i64,
}

impl ScheduleResponse {
    fn into_charge(self) -> Result<ScheduledCharge, GatewayError> {
        let order_id = OrderId::new(self.merchant_uid)
            .map_err(|e| GatewayError::malformed(format!("bad merchant_uid: {}", e)))?;
        let charge_at = Timestamp::from_unix_secs(self.schedule_at).ok_or_else(|| {
            GatewayError::malformed(format!("bad schedule_at: {}", self.schedule_at))
        })?;
        Ok(ScheduledCharge {
            order_id,
            charge_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    card_name: Option<String>,
    card_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{BuyerContact, GatewayRejection};

    fn parse<T: DeserializeOwned>(json: &str) -> Result<Reply<T>, GatewayError> {
        serde_json::from_str::<Envelope<T>>(json)
            .unwrap()
            .into_reply("test")
    }

    #[test]
    fn config_trims_trailing_slash_and_hides_secret() {
        let config = PortOneConfig::new("key", SecretString::new("very-secret".into()))
            .with_base_url("http://localhost:8080/")
            .with_timeout(Duration::from_secs(3));

        assert_eq!(config.api_base_url(), "http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert!(!format!("{:?}", config).contains("very-secret"));
    }

    #[test]
    fn zero_code_with_body_is_success() {
        let reply = parse::<TokenResponse>(
            r#"{"code":0,"message":null,"response":{"access_token":"abc","now":1,"expired_at":2}}"#,
        )
        .unwrap();
        assert!(matches!(reply, Reply::Success(t) if t.access_token == "abc"));
    }

    #[test]
    fn non_zero_code_is_rejection() {
        let reply = parse::<Vec<ScheduleResponse>>(
            r#"{"code":1,"message":"취소할 예약결제 기록이 존재하지 않습니다.","response":null}"#,
        )
        .unwrap();
        assert!(matches!(reply, Reply::Rejected { code: 1, .. }));
    }

    #[test]
    fn empty_unschedule_is_nothing_scheduled() {
        let result = unschedule_rejection(1, "취소할 예약결제 기록이 존재하지 않습니다.".into());
        assert!(!result.success);
        assert!(result.is_nothing_scheduled());
    }

    #[test]
    fn other_unschedule_refusals_are_not_drift() {
        let result = unschedule_rejection(-1, "F400 merchant not authorized".into());
        assert!(!result.success);
        assert_eq!(result.rejection, Some(GatewayRejection::Refused));
    }

    #[test]
    fn success_without_body_is_malformed() {
        let err = parse::<TokenResponse>(r#"{"code":0,"message":null,"response":null}"#)
            .unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::MalformedResponse);
    }

    #[test]
    fn payment_response_maps_to_record() {
        let payment: PaymentResponse = serde_json::from_str(
            r#"{"imp_uid":"imp_1","merchant_uid":"order_1","amount":9900,
                "status":"paid","customer_uid":"customer_1","paid_at":1700000000}"#,
        )
        .unwrap();
        let record = payment.into_record();

        assert_eq!(record.order_id, "order_1");
        assert_eq!(record.status, RemotePaymentStatus::Paid);
        assert_eq!(record.paid_at.unwrap().as_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn unpaid_payment_has_no_paid_at() {
        let payment: PaymentResponse = serde_json::from_str(
            r#"{"imp_uid":"imp_1","merchant_uid":"order_1","amount":9900,
                "status":"ready","customer_uid":null,"paid_at":0}"#,
        )
        .unwrap();
        assert!(payment.into_record().paid_at.is_none());
    }

    #[test]
    fn schedule_item_serializes_epoch_seconds_and_skips_missing_buyer() {
        let charge_at = Timestamp::from_unix_secs(1_800_000_000).unwrap();
        let request = ScheduleRequest {
            order_id: OrderId::new("scheduled_alice_1_1").unwrap(),
            charge_at,
            amount: 9_900,
            display_name: "BASIC subscription".into(),
            buyer: BuyerContact {
                email: Some("alice@example.com".into()),
                name: None,
                phone: None,
            },
        };

        let json = serde_json::to_value(ScheduleItem::from_request(&request)).unwrap();

        assert_eq!(json["merchant_uid"], "scheduled_alice_1_1");
        assert_eq!(json["schedule_at"], 1_800_000_000i64);
        assert_eq!(json["buyer_email"], "alice@example.com");
        assert!(json.get("buyer_name").is_none());
    }

    #[test]
    fn schedule_response_rejects_bad_order_id() {
        let bad = ScheduleResponse {
            merchant_uid: "".into(),
            schedule_at: 1_800_000_000,
        };
        assert_eq!(
            bad.into_charge().unwrap_err().code,
            GatewayErrorCode::MalformedResponse
        );
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_network_error() {
        let config = PortOneConfig::new("key", SecretString::new("secret".into()))
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let gateway = PortOneGateway::new(config).unwrap();

        let err = gateway.fetch_access_token().await.unwrap_err();
        assert!(err.retryable);
    }
}
