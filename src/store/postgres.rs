//! PostgreSQL store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::aggregates::product::natural_key;
use crate::domain::aggregates::{Address, BrandRecord, CategoryRecord, LineItem, Order, OrderStatus, PaymentMethod, ProductRecord, StatusChange, Upserted, VariantRecord};
use crate::domain::value_objects::{Quantity, ReferenceCode};
use crate::store::{CatalogStore, OrderFilter, OrderStore};
use crate::{CommerceError, Result};

const UPDATE_STATUS_SQL: &str = "UPDATE orders SET status = $3, payment_id = COALESCE($4, payment_id), tracking_number = COALESCE($5, tracking_number), \
     estimated_delivery_date = COALESCE($6, estimated_delivery_date), notes = COALESCE($7, notes), updated_at = NOW() \
     WHERE id = $1 AND status = $2 RETURNING *";

const ASSIGN_REFERENCE_SQL: &str = "UPDATE orders SET reference_code = $2, updated_at = NOW() \
     WHERE id = $1 AND status = 'PENDING_PAYMENT' AND reference_code IS NULL RETURNING *";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    total_amount: Decimal,
    currency: String,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    payment_method: String,
    payment_id: Option<String>,
    gateway_token: Option<String>,
    gateway_token_at: Option<DateTime<Utc>>,
    reference_code: Option<String>,
    tracking_number: Option<String>,
    estimated_delivery_date: Option<NaiveDate>,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LineItemRow { id: Uuid, order_id: Uuid, product_id: String, name: Option<String>, quantity: i32, unit_price: Decimal }

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> Result<Order> {
        let corrupt = |what: &str, detail: String| CommerceError::Internal(format!("order {} has invalid {what}: {detail}", self.id));
        Ok(Order {
            id: self.id,
            user_id: self.user_id.clone(),
            items,
            total_amount: self.total_amount,
            currency: self.currency.clone(),
            shipping_address: self.shipping_address.0.clone(),
            billing_address: self.billing_address.0.clone(),
            payment_method: self.payment_method.parse::<PaymentMethod>().map_err(|e| corrupt("payment method", e))?,
            payment_id: self.payment_id.clone(),
            gateway_token: self.gateway_token.clone(),
            gateway_token_at: self.gateway_token_at,
            reference_code: self.reference_code.as_deref().map(|c| ReferenceCode::parse(c).ok_or_else(|| corrupt("reference code", c.to_string()))).transpose()?,
            tracking_number: self.tracking_number.clone(),
            estimated_delivery_date: self.estimated_delivery_date,
            notes: self.notes.clone(),
            status: self.status.parse::<OrderStatus>().map_err(|e| corrupt("status", e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = CommerceError;
    fn try_from(row: LineItemRow) -> Result<Self> {
        let quantity = u32::try_from(row.quantity).ok().and_then(Quantity::new)
            .ok_or_else(|| CommerceError::Internal(format!("line item {} has quantity {}", row.id, row.quantity)))?;
        Ok(LineItem { id: row.id, product_id: row.product_id, name: row.name, quantity, unit_price: row.unit_price })
    }
}

fn unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn to_i32(value: u32, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| CommerceError::validation(format!("{what} {value} is too large")))
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| CommerceError::Internal(format!("migration failed: {e}")))
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, LineItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_order: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in item_rows {
            by_order.entry(row.order_id).or_default().push(LineItem::try_from(row)?);
        }
        rows.into_iter().map(|r| { let items = by_order.remove(&r.id).unwrap_or_default(); r.into_order(items) }).collect()
    }

    async fn one(&self, row: Option<OrderRow>) -> Result<Option<Order>> {
        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO orders (id, user_id, total_amount, currency, shipping_address, billing_address, payment_method, payment_id, gateway_token, gateway_token_at, reference_code, tracking_number, estimated_delivery_date, notes, status, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(order.id).bind(&order.user_id).bind(order.total_amount).bind(&order.currency)
            .bind(Json(&order.shipping_address)).bind(Json(&order.billing_address)).bind(order.payment_method.as_str())
            .bind(&order.payment_id).bind(&order.gateway_token).bind(order.gateway_token_at).bind(order.reference_code.as_ref().map(|c| c.as_str()))
            .bind(&order.tracking_number).bind(order.estimated_delivery_date).bind(&order.notes).bind(order.status.as_str())
            .bind(order.created_at).bind(order.updated_at)
            .execute(&mut *tx)
            .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query("INSERT INTO order_items (id, order_id, position, product_id, name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(item.id).bind(order.id).bind(i32::try_from(position).map_err(|_| CommerceError::validation("too many line items"))?)
                .bind(&item.product_id).bind(&item.name).bind(to_i32(item.quantity.value(), "quantity")?).bind(item.unit_price)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        self.one(row).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        if let Some(user_id) = &filter.user_id { qb.push(" AND user_id = ").push_bind(user_id.clone()); }
        if let Some(status) = filter.status { qb.push(" AND status = ").push_bind(status.as_str()); }
        if let Some(from) = filter.from { qb.push(" AND created_at >= ").push_bind(from); }
        if let Some(to) = filter.to { qb.push(" AND created_at <= ").push_bind(to); }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn update_status(&self, id: Uuid, expected: OrderStatus, change: &StatusChange) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(UPDATE_STATUS_SQL)
            .bind(id).bind(expected.as_str()).bind(change.status.as_str())
            .bind(&change.payment_id).bind(&change.tracking_number).bind(change.estimated_delivery_date).bind(&change.notes)
            .fetch_optional(&self.pool)
            .await?;
        self.one(row).await
    }

    async fn assign_reference_code(&self, id: Uuid, code: &ReferenceCode) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(ASSIGN_REFERENCE_SQL)
            .bind(id).bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| if unique_violation(&e) { CommerceError::ReferenceTaken } else { e.into() })?;
        self.one(row).await
    }

    async fn record_gateway_token(&self, id: Uuid, token: &str) -> Result<()> {
        sqlx::query("UPDATE orders SET gateway_token = $2, gateway_token_at = NOW(), updated_at = NOW() WHERE id = $1").bind(id).bind(token).execute(&self.pool).await?;
        Ok(())
    }

    async fn stale_pending(&self, method: PaymentMethod, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE status = 'PENDING_PAYMENT' AND payment_method = $1 \
             AND COALESCE(gateway_token_at, created_at) < $2 ORDER BY created_at")
            .bind(method.as_str()).bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        self.attach_items(rows).await
    }
}

fn upserted(inserted: bool) -> Upserted { if inserted { Upserted::Created } else { Upserted::Updated } }

#[async_trait]
impl CatalogStore for PgStore {
    async fn category_id(&self, name: &str) -> Result<Option<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM categories WHERE name_key = $1").bind(natural_key(name)).fetch_optional(&self.pool).await?)
    }

    async fn brand_id(&self, name: &str) -> Result<Option<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM brands WHERE name_key = $1").bind(natural_key(name)).fetch_optional(&self.pool).await?)
    }

    async fn product_id(&self, name: &str, category_id: Uuid) -> Result<Option<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM products WHERE name_key = $1 AND category_id = $2")
            .bind(natural_key(name)).bind(category_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<Upserted> {
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO categories (id, name, name_key, description, parent_id) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name_key) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, parent_id = EXCLUDED.parent_id, updated_at = NOW() \
             RETURNING (xmax = 0)")
            .bind(Uuid::now_v7()).bind(&record.name).bind(natural_key(&record.name)).bind(&record.description).bind(record.parent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(upserted(inserted))
    }

    async fn upsert_brand(&self, record: &BrandRecord) -> Result<Upserted> {
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO brands (id, name, name_key, description, website) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name_key) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, website = EXCLUDED.website, updated_at = NOW() \
             RETURNING (xmax = 0)")
            .bind(Uuid::now_v7()).bind(&record.name).bind(natural_key(&record.name)).bind(&record.description).bind(&record.website)
            .fetch_one(&self.pool)
            .await?;
        Ok(upserted(inserted))
    }

    async fn upsert_product(&self, record: &ProductRecord) -> Result<Upserted> {
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO products (id, name, name_key, category_id, brand_id, price, sku, stock, description) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (name_key, category_id) DO UPDATE SET name = EXCLUDED.name, brand_id = EXCLUDED.brand_id, price = EXCLUDED.price, \
             sku = EXCLUDED.sku, stock = EXCLUDED.stock, description = EXCLUDED.description, updated_at = NOW() \
             RETURNING (xmax = 0)")
            .bind(Uuid::now_v7()).bind(&record.name).bind(natural_key(&record.name)).bind(record.category_id).bind(record.brand_id)
            .bind(record.price).bind(record.sku.as_ref().map(|s| s.as_str())).bind(to_i32(record.stock, "stock")?).bind(&record.description)
            .fetch_one(&self.pool)
            .await?;
        Ok(upserted(inserted))
    }

    async fn upsert_variant(&self, record: &VariantRecord) -> Result<Upserted> {
        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO product_variants (id, product_id, name, value, name_key, value_key, price_adjustment, stock) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (product_id, name_key, value_key) DO UPDATE SET name = EXCLUDED.name, value = EXCLUDED.value, \
             price_adjustment = EXCLUDED.price_adjustment, stock = EXCLUDED.stock, updated_at = NOW() \
             RETURNING (xmax = 0)")
            .bind(Uuid::now_v7()).bind(record.product_id).bind(&record.name).bind(&record.value)
            .bind(natural_key(&record.name)).bind(natural_key(&record.value)).bind(record.price_adjustment).bind(to_i32(record.stock, "stock")?)
            .fetch_one(&self.pool)
            .await?;
        Ok(upserted(inserted))
    }
}
