#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use opensase_storefront::config::AppConfig;
use opensase_storefront::domain::aggregates::{CreateOrder, Order};
use opensase_storefront::http::AppState;
use opensase_storefront::services::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway, PaymentResult};
use opensase_storefront::services::{BuyerInfo, Caller, EventPublisher};
use opensase_storefront::store::MemoryStore;
use opensase_storefront::{CommerceError, Result};

pub const BASE_URL: &str = "https://shop.test";

#[derive(Clone, Debug)]
pub enum InitReply { Open, Refuse(&'static str), Unreachable }

/// In-process gateway. Sessions get token `tok-<order id>`; results are
/// scripted per token.
pub struct ScriptedGateway {
    init: Mutex<InitReply>,
    results: Mutex<HashMap<String, PaymentResult>>,
    pub retrieve_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self { init: Mutex::new(InitReply::Open), results: Mutex::new(HashMap::new()), retrieve_calls: AtomicUsize::new(0) }
    }

    pub fn reply_to_init(&self, reply: InitReply) { *self.init.lock().unwrap() = reply; }

    pub fn token_for(order_id: Uuid) -> String { format!("tok-{order_id}") }

    pub fn pay(&self, order_id: Uuid, payment_id: &str) {
        self.script(order_id, PaymentResult {
            status: "success".into(),
            payment_status: Some("SUCCESS".into()),
            payment_id: Some(payment_id.into()),
            conversation_id: Some(order_id.to_string()),
            ..Default::default()
        });
    }

    pub fn decline(&self, order_id: Uuid, error_group: &str) {
        self.script(order_id, PaymentResult {
            status: "success".into(),
            payment_status: Some("FAILURE".into()),
            conversation_id: Some(order_id.to_string()),
            error_message: Some("Card declined".into()),
            error_group: Some(error_group.into()),
            ..Default::default()
        });
    }

    pub fn script(&self, order_id: Uuid, result: PaymentResult) {
        self.results.lock().unwrap().insert(Self::token_for(order_id), result);
    }

    pub fn retrieve_count(&self) -> usize { self.retrieve_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let reply = self.init.lock().unwrap().clone();
        match reply {
            InitReply::Open => {
                let token = format!("tok-{}", request.conversation_id);
                Ok(CheckoutSession {
                    status: "success".into(),
                    payment_page_url: Some(format!("https://pay.test/{token}")),
                    token: Some(token),
                    ..Default::default()
                })
            }
            InitReply::Refuse(message) => Ok(CheckoutSession { status: "failure".into(), error_message: Some(message.into()), ..Default::default() }),
            InitReply::Unreachable => Err(CommerceError::Gateway("connection refused".into())),
        }
    }

    async fn retrieve(&self, token: &str) -> Result<PaymentResult> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.results.lock().unwrap().get(token).cloned().ok_or_else(|| CommerceError::Gateway(format!("unknown token {token}")))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub state: AppState,
}

pub fn config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "STORAGE" => Some("memory".into()),
        "PUBLIC_BASE_URL" => Some(BASE_URL.into()),
        "BANK_NAME" => Some("First Test Bank".into()),
        "BANK_ACCOUNT_HOLDER" => Some("OpenSASE Ltd".into()),
        "BANK_IBAN" => Some("GB00TEST00000000000000".into()),
        _ => None,
    })
    .unwrap()
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let state = AppState::new(store.clone(), EventPublisher::disabled(), gateway.clone(), &config());
    Harness { store, gateway, state }
}

pub fn address() -> serde_json::Value {
    json!({"full_name": "Ada Lovelace", "line1": "1 Main St", "city": "London", "postal_code": "N1 9GU", "country": "GB"})
}

/// Two of p1 at 50 and one of p2 at 30.
pub fn checkout(payment_method: &str) -> CreateOrder {
    serde_json::from_value(json!({
        "items": [
            {"product_id": "p1", "name": "Widget", "quantity": 2, "price": 50},
            {"product_id": "p2", "name": "Gadget", "quantity": 1, "price": 30}
        ],
        "total_amount": 130,
        "shipping_address": address(),
        "billing_address": address(),
        "payment_method": payment_method
    }))
    .unwrap()
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo { name: "Ada".into(), surname: "Lovelace".into(), email: "ada@example.com".into(), ..Default::default() }
}

pub fn customer() -> Caller { Caller::customer("user-1") }
pub fn admin() -> Caller { Caller::admin("admin-1") }

impl Harness {
    pub async fn order(&self, payment_method: &str) -> Order {
        self.state.orders.create_order(&customer().user_id, &checkout(payment_method)).await.unwrap()
    }

    /// A hosted gateway order whose checkout session is open.
    pub async fn gateway_order(&self) -> Order {
        let order = self.order("hosted_gateway").await;
        self.state.checkout.initiate(&customer(), order.id, &buyer()).await.unwrap();
        order
    }
}
