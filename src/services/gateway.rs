//! Hosted payment gateway client.
//!
//! The gateway hosts the card form. We create a checkout session, redirect
//! the buyer to its payment page, and later retrieve the authoritative result
//! by the opaque token the gateway posts back to our callback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::{CommerceError, Result};

const INITIALIZE_PATH: &str = "/payment/checkoutform/initialize";
const RETRIEVE_PATH: &str = "/payment/checkoutform/auth/ecom/detail";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub conversation_id: String,
    pub price: String,
    pub paid_price: String,
    pub currency: String,
    pub basket_id: String,
    pub basket_items: Vec<BasketItem>,
    pub buyer: Buyer,
    pub shipping_address: GatewayAddress,
    pub billing_address: GatewayAddress,
    pub callback_url: String,
}

/// `price` is the line total; basket prices must add up to the request price.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketItem { pub id: String, pub name: String, pub category1: String, pub item_type: String, pub price: String }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub identity_number: String,
    pub gsm_number: Option<String>,
    pub registration_address: String,
    pub city: String,
    pub country: String,
    pub zip_code: String,
    pub ip: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress { pub contact_name: String, pub city: String, pub country: String, pub address: String, pub zip_code: String }

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub status: String,
    pub token: Option<String>,
    pub payment_page_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl CheckoutSession {
    /// Usable only when the gateway accepted it and handed back where to send the buyer.
    pub fn redirect(&self) -> Option<(&str, &str)> {
        if self.status != "success" { return None; }
        Some((self.token.as_deref()?, self.payment_page_url.as_deref()?))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    /// API-level outcome of the retrieve call itself.
    pub status: String,
    /// Outcome of the buyer's payment, `SUCCESS` or `FAILURE`.
    pub payment_status: Option<String>,
    pub payment_id: Option<String>,
    pub conversation_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_group: Option<String>,
}

impl PaymentResult {
    pub fn is_paid(&self) -> bool { self.status == "success" && self.payment_status.as_deref() == Some("SUCCESS") }

    /// The gateway answered and the payment definitively failed. A result
    /// that is neither paid nor declined means the session is still open.
    pub fn is_declined(&self) -> bool { self.status == "success" && self.payment_status.as_deref() == Some("FAILURE") }

    pub fn failure_message(&self) -> String {
        self.error_message.clone().or_else(|| self.error_code.clone()).unwrap_or_else(|| "payment was not completed".to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session. `Err` means the outcome is unknown
    /// (transport failure); a refused request comes back as `Ok` with a non-success status.
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Fetches the authoritative payment result for a callback token.
    async fn retrieve(&self, token: &str) -> Result<PaymentResult>;
}

/// JSON-over-HTTPS gateway client.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> { token: &'a str }

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&config.api_key).map_err(|e| CommerceError::Config(format!("invalid gateway API key: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CommerceError::Config(format!("failed to build gateway HTTP client: {e}")))?;

        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    async fn post<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await
            .map_err(|e| CommerceError::Gateway(format!("request to {path} failed: {e}")))?;

        let status = response.status();
        debug!(%status, path, "gateway response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommerceError::Gateway(format!("gateway returned {status}: {body}")));
        }
        response.json::<T>().await.map_err(|e| CommerceError::Gateway(format!("malformed gateway response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.post(INITIALIZE_PATH, request).await
    }

    async fn retrieve(&self, token: &str) -> Result<PaymentResult> {
        self.post(RETRIEVE_PATH, &RetrieveRequest { token }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> HttpGateway {
        HttpGateway::new(&GatewayConfig { base_url: base_url.to_string(), api_key: "test-key".into(), timeout: Duration::from_secs(2) }).unwrap()
    }

    fn request() -> CheckoutRequest {
        let address = GatewayAddress { contact_name: "Ada".into(), city: "London".into(), country: "GB".into(), address: "1 Main St".into(), zip_code: "N1".into() };
        CheckoutRequest {
            conversation_id: "order-1".into(), price: "130.00".into(), paid_price: "130.00".into(), currency: "USD".into(), basket_id: "order-1".into(),
            basket_items: vec![BasketItem { id: "p1".into(), name: "Widget".into(), category1: "General".into(), item_type: "PHYSICAL".into(), price: "130.00".into() }],
            buyer: Buyer { id: "u1".into(), name: "Ada".into(), surname: "Lovelace".into(), email: "ada@example.com".into(), identity_number: "11111111111".into(), gsm_number: None,
                registration_address: "1 Main St".into(), city: "London".into(), country: "GB".into(), zip_code: "N1".into(), ip: "127.0.0.1".into() },
            shipping_address: address.clone(), billing_address: address, callback_url: "http://shop/callback?order_id=order-1".into(),
        }
    }

    #[tokio::test]
    async fn test_initialize_sends_camel_case_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INITIALIZE_PATH))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({"conversationId": "order-1", "paidPrice": "130.00", "basketItems": [{"itemType": "PHYSICAL"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success", "token": "tok_1", "paymentPageUrl": "https://pay.example/tok_1"})))
            .mount(&server)
            .await;

        let session = gateway(&server.uri()).initialize(&request()).await.unwrap();
        assert_eq!(session.redirect(), Some(("tok_1", "https://pay.example/tok_1")));
    }

    #[tokio::test]
    async fn test_refused_session_has_no_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INITIALIZE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "failure", "errorCode": "12", "errorMessage": "Invalid amount"})))
            .mount(&server)
            .await;

        let session = gateway(&server.uri()).initialize(&request()).await.unwrap();
        assert_eq!(session.redirect(), None);
        assert_eq!(session.error_message.as_deref(), Some("Invalid amount"));
    }

    #[tokio::test]
    async fn test_retrieve_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RETRIEVE_PATH))
            .and(body_partial_json(serde_json::json!({"token": "tok_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "paymentStatus": "SUCCESS", "paymentId": "pay_9", "conversationId": "order-1"
            })))
            .mount(&server)
            .await;

        let result = gateway(&server.uri()).retrieve("tok_1").await.unwrap();
        assert!(result.is_paid());
        assert_eq!(result.payment_id.as_deref(), Some("pay_9"));
    }

    #[tokio::test]
    async fn test_http_error_is_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).retrieve("tok_1").await.unwrap_err();
        assert!(matches!(err, CommerceError::Gateway(ref m) if m.contains("503")), "{err}");
    }
}
