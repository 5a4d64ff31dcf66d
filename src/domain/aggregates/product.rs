//! Catalog records
//!
//! Write-side shapes for categories, brands, products and variants as the
//! import pipeline upserts them. Each carries the natural key it is matched on.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::Sku;

/// Keyed by `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryRecord { pub name: String, pub description: Option<String>, pub parent_id: Option<Uuid> }

/// Keyed by `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct BrandRecord { pub name: String, pub description: Option<String>, pub website: Option<String> }

/// Keyed by `(name, category_id)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductRecord {
    pub name: String,
    pub category_id: Uuid,
    pub brand_id: Option<Uuid>,
    pub price: Decimal,
    pub sku: Option<Sku>,
    pub stock: u32,
    pub description: Option<String>,
}

/// Keyed by `(product_id, name, value)`, e.g. `("Color", "Red")`.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantRecord { pub product_id: Uuid, pub name: String, pub value: String, pub price_adjustment: Decimal, pub stock: u32 }

/// What an upsert did to the row matching the natural key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upserted { Created, Updated }

/// Normalises a natural-key name the same way for lookups and writes.
pub fn natural_key(name: &str) -> String { name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase() }
