//! PayPal Orders v2 client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::lock::Mutex;
use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{CaptureResult, PaymentError, PaymentGateway};
use crate::pricing::{format_cents, parse_cents};

pub const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";
const ALREADY_CAPTURED: &str = "ORDER_ALREADY_CAPTURED";
/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    /// e.g. `"https://api-m.sandbox.paypal.com"`.
    pub api_base: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct PayPalGateway {
    config: PayPalConfig,
    http: Client,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Option<Money>,
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

impl OrderResponse {
    /// Prefers the captured amount over the requested one.
    fn into_result(self) -> Result<CaptureResult, PaymentError> {
        let unit = self.purchase_units.into_iter().next();
        let (capture, requested) = match unit {
            Some(unit) => (
                unit.payments.and_then(|p| p.captures.into_iter().next()),
                unit.amount,
            ),
            None => (None, None),
        };
        let capture_id = capture.as_ref().map(|c| c.id.clone());
        let money = capture.and_then(|c| c.amount).or(requested);

        let (amount_cents, currency) = match money {
            Some(money) => {
                let cents = parse_cents(&money.value).ok_or_else(|| {
                    PaymentError::UnexpectedResponse(format!("bad amount {:?}", money.value))
                })?;
                (Some(cents), Some(money.currency_code))
            }
            None => (None, None),
        };

        Ok(CaptureResult {
            order_id: self.id,
            capture_id,
            status: self.status,
            amount_cents,
            currency,
        })
    }
}

fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{client_id}:{client_secret}"))
    )
}

fn is_already_captured(body: &str) -> bool {
    serde_json::from_str::<ErrorResponse>(body)
        .unwrap_or_default()
        .details
        .iter()
        .any(|detail| detail.issue == ALREADY_CAPTURED)
}

/// Path of a processor order. Ids are upper-case alphanumeric; anything
/// else is refused before a URL is built from it.
fn order_path(order_id: &str, suffix: &str) -> Result<String, PaymentError> {
    if order_id.is_empty() || !order_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(PaymentError::InvalidOrderId(order_id.to_string()));
    }
    Ok(format!("/v2/checkout/orders/{order_id}{suffix}"))
}

/// Maps a non-success reply to a typed error.
async fn failure(response: Response, order_id: &str) -> PaymentError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status == StatusCode::UNPROCESSABLE_ENTITY && is_already_captured(&text) {
        return PaymentError::AlreadyCaptured(order_id.to_string());
    }
    if status.is_client_error() {
        PaymentError::Rejected(format!("status {status}: {text}"))
    } else {
        PaymentError::UnexpectedResponse(format!("status {status}: {text}"))
    }
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Client-credentials token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .header(
                "Authorization",
                basic_auth(&self.config.client_id, &self.config.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, "").await);
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!("Obtained PayPal access token valid for {:?}", lifetime);
        *cached = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        description: &str,
    ) -> Result<String, PaymentError> {
        if amount_cents <= 0 {
            return Err(PaymentError::InvalidAmount(amount_cents));
        }
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "description": description,
                "amount": {
                    "currency_code": currency,
                    "value": format_cents(amount_cents),
                },
            }],
        });

        let response = self
            .http
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, "").await);
        }

        let order: OrderResponse = response.json().await?;
        info!(
            "Created PayPal order {} for {} {}",
            order.id,
            format_cents(amount_cents),
            currency
        );
        Ok(order.id)
    }

    async fn capture_order(&self, order_id: &str) -> Result<CaptureResult, PaymentError> {
        let path = order_path(order_id, "/capture")?;
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url(&path))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, order_id).await);
        }

        let order: OrderResponse = response.json().await?;
        order.into_result()
    }

    async fn get_order(&self, order_id: &str) -> Result<CaptureResult, PaymentError> {
        let path = order_path(order_id, "")?;
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.url(&path))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(response, order_id).await);
        }

        let order: OrderResponse = response.json().await?;
        order.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_credentials() {
        assert_eq!(basic_auth("id", "secret"), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn capture_reply_yields_captured_amount() {
        let raw = r#"{
            "id": "ORDER123",
            "status": "COMPLETED",
            "purchase_units": [{
                "amount": {"currency_code": "USD", "value": "97.17"},
                "payments": {"captures": [{
                    "id": "CAPTURE9",
                    "status": "COMPLETED",
                    "amount": {"currency_code": "USD", "value": "97.17"}
                }]}
            }]
        }"#;
        let order: OrderResponse = serde_json::from_str(raw).expect("parse");
        let result = order.into_result().expect("result");

        assert!(result.is_completed());
        assert_eq!(result.capture_id.as_deref(), Some("CAPTURE9"));
        assert_eq!(result.amount_cents, Some(9717));
        assert_eq!(result.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn lookup_without_capture_uses_requested_amount() {
        let raw = r#"{
            "id": "ORDER123",
            "status": "APPROVED",
            "purchase_units": [{"amount": {"currency_code": "USD", "value": "29.99"}}]
        }"#;
        let order: OrderResponse = serde_json::from_str(raw).expect("parse");
        let result = order.into_result().expect("result");

        assert!(!result.is_completed());
        assert_eq!(result.capture_id, None);
        assert_eq!(result.amount_cents, Some(2999));
    }

    #[test]
    fn detects_already_captured_issue() {
        let body = r#"{"name":"UNPROCESSABLE_ENTITY","details":[{"issue":"ORDER_ALREADY_CAPTURED"}]}"#;
        assert!(is_already_captured(body));
        assert!(!is_already_captured(r#"{"details":[{"issue":"INSTRUMENT_DECLINED"}]}"#));
        assert!(!is_already_captured("not json"));
    }

    #[actix_web::test]
    async fn non_positive_amounts_never_reach_the_processor() {
        let gateway = PayPalGateway::new(PayPalConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
        });
        assert!(matches!(
            gateway.create_order(0, "USD", "Vehicle reports").await,
            Err(PaymentError::InvalidAmount(0))
        ));
    }

    #[test]
    fn order_paths_only_take_alphanumeric_ids() {
        assert_eq!(
            order_path("5O190127TN364715T", "/capture").expect("valid id"),
            "/v2/checkout/orders/5O190127TN364715T/capture"
        );
        for id in ["", "X/../../v1/oauth2/token", "ORDER?x=1", "ORDER%2F", "ORDÉR"] {
            assert!(matches!(
                order_path(id, ""),
                Err(PaymentError::InvalidOrderId(_))
            ));
        }
    }

    #[actix_web::test]
    async fn traversal_ids_never_reach_the_processor() {
        // Nothing listens on the api base; a request would fail as Transport.
        let gateway = PayPalGateway::new(PayPalConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
        });
        assert!(matches!(
            gateway.get_order("X/../../v1/oauth2/token").await,
            Err(PaymentError::InvalidOrderId(_))
        ));
        assert!(matches!(
            gateway.capture_order("X/../../v1/oauth2/token").await,
            Err(PaymentError::InvalidOrderId(_))
        ));
    }
}
