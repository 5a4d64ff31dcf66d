//! OpenSASE Storefront - order, payment and catalog import service

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::config::{AppConfig, StorageBackend};
use opensase_storefront::http::{router, AppState};
use opensase_storefront::services::{EventPublisher, HostedCheckout, HttpGateway, PaymentGateway};
use opensase_storefront::store::{MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let events = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => EventPublisher::nats(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events disabled");
                EventPublisher::disabled()
            }
        },
        None => EventPublisher::disabled(),
    };
    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpGateway::new(&config.gateway)?);

    let state = match config.storage {
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().context("DATABASE_URL is required for postgres storage")?;
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            AppState::new(Arc::new(store), events, gateway, &config)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            AppState::new(Arc::new(MemoryStore::new()), events, gateway, &config)
        }
    };

    spawn_reconciler(state.checkout.clone(), &config);

    let app = router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("OpenSASE Storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

/// Settles gateway orders whose callback never arrived.
fn spawn_reconciler(checkout: HostedCheckout, config: &AppConfig) {
    let (max_age, every) = (config.reconcile_after, config.reconcile_interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = checkout.reconcile_stale(max_age).await {
                tracing::warn!(error = %e, "stale order reconciliation failed");
            }
        }
    });
}
