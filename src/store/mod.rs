//! Persistence seam.
//!
//! Services receive an explicitly constructed store handle; nothing here is
//! global. [`PgStore`] backs production, [`MemoryStore`] backs tests and
//! `STORAGE=memory` runs with the same semantics.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::{BrandRecord, CategoryRecord, Order, OrderStatus, PaymentMethod, ProductRecord, StatusChange, Upserted, VariantRecord};
use crate::domain::value_objects::ReferenceCode;
use crate::Result;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.as_ref().map_or(true, |u| &order.user_id == u)
            && self.status.map_or(true, |s| order.status == s)
            && self.from.map_or(true, |from| order.created_at >= from)
            && self.to.map_or(true, |to| order.created_at <= to)
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and all of its line items, or nothing.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Applies `change` only while the stored status still equals `expected`.
    /// `Ok(None)` means the row was missing or had moved on.
    async fn update_status(&self, id: Uuid, expected: OrderStatus, change: &StatusChange) -> Result<Option<Order>>;

    /// Stores a bank-transfer reference on a pending order that has none yet.
    /// Fails with `ReferenceTaken` when another order already holds `code`.
    async fn assign_reference_code(&self, id: Uuid, code: &ReferenceCode) -> Result<Option<Order>>;

    /// Stores the checkout token and stamps the time the session was opened.
    async fn record_gateway_token(&self, id: Uuid, token: &str) -> Result<()>;

    /// Orders of `method` still in `PENDING_PAYMENT` that have been waiting
    /// since before `cutoff`. Waiting starts when the gateway session was
    /// opened, or at creation for orders that never got one.
    async fn stale_pending(&self, method: PaymentMethod, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Catalog writes used by the import pipeline. Lookups take display names and
/// match on the normalised natural key.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn category_id(&self, name: &str) -> Result<Option<Uuid>>;
    async fn brand_id(&self, name: &str) -> Result<Option<Uuid>>;
    async fn product_id(&self, name: &str, category_id: Uuid) -> Result<Option<Uuid>>;

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<Upserted>;
    async fn upsert_brand(&self, record: &BrandRecord) -> Result<Upserted>;
    async fn upsert_product(&self, record: &ProductRecord) -> Result<Upserted>;
    async fn upsert_variant(&self, record: &VariantRecord) -> Result<Upserted>;
}
