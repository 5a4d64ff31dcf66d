//! In-memory store

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::product::natural_key;
use crate::domain::aggregates::{BrandRecord, CategoryRecord, Order, OrderStatus, PaymentMethod, ProductRecord, StatusChange, Upserted, VariantRecord};
use crate::domain::value_objects::ReferenceCode;
use crate::store::{CatalogStore, OrderFilter, OrderStore};
use crate::{CommerceError, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    /// Assigned reference codes. Only written while `orders` is write-locked.
    references: RwLock<HashSet<ReferenceCode>>,
    catalog: RwLock<Catalog>,
}

#[derive(Debug, Default)]
struct Catalog {
    categories: HashMap<String, (Uuid, CategoryRecord)>,
    brands: HashMap<String, (Uuid, BrandRecord)>,
    products: HashMap<(String, Uuid), (Uuid, ProductRecord)>,
    variants: HashMap<(Uuid, String, String), VariantRecord>,
}

/// Row counts, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts { pub categories: usize, pub brands: usize, pub products: usize, pub variants: usize }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn order_count(&self) -> usize { self.orders.read().await.len() }

    pub async fn line_item_count(&self) -> usize { self.orders.read().await.values().map(|o| o.items.len()).sum() }

    pub async fn catalog_counts(&self) -> CatalogCounts {
        let c = self.catalog.read().await;
        CatalogCounts { categories: c.categories.len(), brands: c.brands.len(), products: c.products.len(), variants: c.variants.len() }
    }

    pub async fn product(&self, name: &str, category_id: Uuid) -> Option<ProductRecord> {
        self.catalog.read().await.products.get(&(natural_key(name), category_id)).map(|(_, p)| p.clone())
    }
}

fn upsert<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, value: V) -> Upserted {
    match map.insert(key, value) { Some(_) => Upserted::Updated, None => Upserted::Created }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) { return Err(CommerceError::Conflict(format!("order {} already exists", order.id))); }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> { Ok(self.orders.read().await.get(&id).cloned()) }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut found: Vec<Order> = self.orders.read().await.values().filter(|o| filter.matches(o)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn update_status(&self, id: Uuid, expected: OrderStatus, change: &StatusChange) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else { return Ok(None) };
        if order.status != expected { return Ok(None); }
        order.apply(change);
        Ok(Some(order.clone()))
    }

    async fn assign_reference_code(&self, id: Uuid, code: &ReferenceCode) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        let mut references = self.references.write().await;
        if references.contains(code) { return Err(CommerceError::ReferenceTaken); }
        let Some(order) = orders.get_mut(&id) else { return Ok(None) };
        if order.status != OrderStatus::PendingPayment || order.reference_code.is_some() { return Ok(None); }
        references.insert(code.clone());
        order.reference_code = Some(code.clone());
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn record_gateway_token(&self, id: Uuid, token: &str) -> Result<()> {
        if let Some(order) = self.orders.write().await.get_mut(&id) {
            let now = Utc::now();
            order.gateway_token = Some(token.to_string());
            order.gateway_token_at = Some(now);
            order.updated_at = now;
        }
        Ok(())
    }

    async fn stale_pending(&self, method: PaymentMethod, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut stale: Vec<Order> = self.orders.read().await.values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.payment_method == method)
            .filter(|o| o.gateway_token_at.unwrap_or(o.created_at) < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn category_id(&self, name: &str) -> Result<Option<Uuid>> {
        Ok(self.catalog.read().await.categories.get(&natural_key(name)).map(|(id, _)| *id))
    }

    async fn brand_id(&self, name: &str) -> Result<Option<Uuid>> {
        Ok(self.catalog.read().await.brands.get(&natural_key(name)).map(|(id, _)| *id))
    }

    async fn product_id(&self, name: &str, category_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.catalog.read().await.products.get(&(natural_key(name), category_id)).map(|(id, _)| *id))
    }

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<Upserted> {
        let mut c = self.catalog.write().await;
        let key = natural_key(&record.name);
        let id = c.categories.get(&key).map_or_else(Uuid::now_v7, |(id, _)| *id);
        Ok(upsert(&mut c.categories, key, (id, record.clone())))
    }

    async fn upsert_brand(&self, record: &BrandRecord) -> Result<Upserted> {
        let mut c = self.catalog.write().await;
        let key = natural_key(&record.name);
        let id = c.brands.get(&key).map_or_else(Uuid::now_v7, |(id, _)| *id);
        Ok(upsert(&mut c.brands, key, (id, record.clone())))
    }

    async fn upsert_product(&self, record: &ProductRecord) -> Result<Upserted> {
        let mut c = self.catalog.write().await;
        let key = (natural_key(&record.name), record.category_id);
        let id = c.products.get(&key).map_or_else(Uuid::now_v7, |(id, _)| *id);
        Ok(upsert(&mut c.products, key, (id, record.clone())))
    }

    async fn upsert_variant(&self, record: &VariantRecord) -> Result<Upserted> {
        let mut c = self.catalog.write().await;
        let key = (record.product_id, natural_key(&record.name), natural_key(&record.value));
        Ok(upsert(&mut c.variants, key, record.clone()))
    }
}
