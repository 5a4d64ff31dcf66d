//! HTTP surface.

pub mod error;
pub mod extract;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::config::AppConfig;
use crate::import::Importer;
use crate::services::{AdminConsole, BankTransfers, EventPublisher, HostedCheckout, OrderService, PaymentGateway};
use crate::store::{CatalogStore, OrderStore};

pub use error::ErrorBody;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub checkout: HostedCheckout,
    pub bank_transfers: BankTransfers,
    pub admin: AdminConsole,
    pub importer: Importer,
}

impl AppState {
    /// Wires every service over one store handle.
    pub fn new<S>(store: Arc<S>, events: EventPublisher, gateway: Arc<dyn PaymentGateway>, config: &AppConfig) -> Self
    where
        S: OrderStore + CatalogStore + 'static,
    {
        let orders = OrderService::new(store.clone(), events.clone(), config.currency.clone());
        Self {
            checkout: HostedCheckout::new(orders.clone(), gateway, config.public_base_url.clone()).with_timeout(config.gateway.timeout),
            bank_transfers: BankTransfers::new(orders.clone(), events, config.bank_account.clone()),
            admin: AdminConsole::new(orders.clone()),
            importer: Importer::new(store),
            orders,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .route("/api/v1/orders", get(handlers::list_orders).post(handlers::create_order))
        .route("/api/v1/orders/:id", get(handlers::get_order))
        .route("/api/v1/orders/:id/cancel", post(handlers::cancel_order))
        .route("/api/v1/orders/:id/payment/gateway", post(handlers::initiate_gateway_payment))
        .route("/api/v1/orders/:id/payment/bank-transfer", post(handlers::initiate_bank_transfer))
        .route("/api/v1/payments/callback", post(handlers::payment_callback))
        .route("/api/v1/admin/orders/status", put(handlers::update_status_batch))
        .route("/api/v1/admin/orders/:id/status", put(handlers::update_status))
        .route("/api/v1/admin/orders/:id/bank-transfer", post(handlers::confirm_bank_transfer))
        .route("/api/v1/admin/import/:kind", post(handlers::import_spreadsheet))
        .route("/api/v1/admin/import/:kind/template", get(handlers::download_template))
        .with_state(state)
}
