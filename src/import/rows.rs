//! Per-row parsing, validation and upsert.

use std::str::FromStr;

use rust_decimal::Decimal;
use validator::Validate;

use crate::domain::aggregates::order::{money_amount, whole_cents};
use crate::domain::aggregates::product::natural_key;
use crate::domain::aggregates::{BrandRecord, CategoryRecord, ProductRecord, Upserted, VariantRecord};
use crate::domain::value_objects::Sku;
use crate::import::{ImportKind, SheetRow};
use crate::store::CatalogStore;
use crate::{CommerceError, Result};

#[derive(Debug, Validate)]
struct CategoryRow {
    #[validate(required(message = "name is required"), length(max = 255, message = "name is longer than 255 characters"))]
    name: Option<String>,
    #[validate(length(max = 2000, message = "description is longer than 2000 characters"))]
    description: Option<String>,
    parent: Option<String>,
}

#[derive(Debug, Validate)]
struct BrandRow {
    #[validate(required(message = "name is required"), length(max = 255, message = "name is longer than 255 characters"))]
    name: Option<String>,
    #[validate(length(max = 2000, message = "description is longer than 2000 characters"))]
    description: Option<String>,
    #[validate(url(message = "website must be a valid URL"))]
    website: Option<String>,
}

#[derive(Debug, Validate)]
struct ProductRow {
    #[validate(required(message = "name is required"), length(max = 255, message = "name is longer than 255 characters"))]
    name: Option<String>,
    #[validate(required(message = "category is required"))]
    category: Option<String>,
    #[validate(required(message = "price is required"), custom = "money_amount")]
    price: Option<Decimal>,
    brand: Option<String>,
    sku: Option<String>,
    stock: Option<u32>,
    #[validate(length(max = 2000, message = "description is longer than 2000 characters"))]
    description: Option<String>,
}

#[derive(Debug, Validate)]
struct VariantRow {
    #[validate(required(message = "product is required"))]
    product: Option<String>,
    #[validate(required(message = "category is required"))]
    category: Option<String>,
    #[validate(required(message = "name is required"), length(max = 100, message = "name is longer than 100 characters"))]
    name: Option<String>,
    #[validate(required(message = "value is required"), length(max = 100, message = "value is longer than 100 characters"))]
    value: Option<String>,
    #[validate(custom = "whole_cents")]
    price_adjustment: Option<Decimal>,
    stock: Option<u32>,
}

/// Imports one row. The error is the message reported for the row.
pub(crate) async fn import_row(catalog: &dyn CatalogStore, kind: ImportKind, row: &SheetRow) -> std::result::Result<Upserted, String> {
    let outcome = match kind {
        ImportKind::Categories => import_category(catalog, row).await,
        ImportKind::Brands => import_brand(catalog, row).await,
        ImportKind::Products => import_product(catalog, row).await,
        ImportKind::Variants => import_variant(catalog, row).await,
    };
    outcome.map_err(|e| match e {
        CommerceError::Validation(messages) => messages.join("; "),
        other => other.to_string(),
    })
}

async fn import_category(catalog: &dyn CatalogStore, row: &SheetRow) -> Result<Upserted> {
    let candidate = CategoryRow { name: text(row, "name"), description: text(row, "description"), parent: text(row, "parent") };
    candidate.validate()?;
    let name = candidate.name.unwrap_or_default();

    let parent_id = match &candidate.parent {
        Some(parent) if natural_key(parent) == natural_key(&name) => return Err(CommerceError::validation("category cannot be its own parent")),
        Some(parent) => Some(catalog.category_id(parent).await?.ok_or_else(|| CommerceError::not_found(format!("parent category '{parent}'")))?),
        None => None,
    };
    catalog.upsert_category(&CategoryRecord { name, description: candidate.description, parent_id }).await
}

async fn import_brand(catalog: &dyn CatalogStore, row: &SheetRow) -> Result<Upserted> {
    let candidate = BrandRow { name: text(row, "name"), description: text(row, "description"), website: text(row, "website") };
    candidate.validate()?;
    catalog.upsert_brand(&BrandRecord { name: candidate.name.unwrap_or_default(), description: candidate.description, website: candidate.website }).await
}

async fn import_product(catalog: &dyn CatalogStore, row: &SheetRow) -> Result<Upserted> {
    let candidate = ProductRow {
        name: text(row, "name"),
        category: text(row, "category"),
        price: number(row, "price")?,
        brand: text(row, "brand"),
        sku: text(row, "sku"),
        stock: count(row, "stock")?,
        description: text(row, "description"),
    };
    candidate.validate()?;

    let category = candidate.category.unwrap_or_default();
    let category_id = catalog.category_id(&category).await?.ok_or_else(|| CommerceError::not_found(format!("category '{category}'")))?;
    let brand_id = match &candidate.brand {
        Some(brand) => Some(catalog.brand_id(brand).await?.ok_or_else(|| CommerceError::not_found(format!("brand '{brand}'")))?),
        None => None,
    };
    let sku = candidate.sku.map(Sku::new).transpose().map_err(|e| CommerceError::validation(format!("sku: {e}")))?;

    catalog.upsert_product(&ProductRecord {
        name: candidate.name.unwrap_or_default(),
        category_id,
        brand_id,
        price: candidate.price.unwrap_or_default(),
        sku,
        stock: candidate.stock.unwrap_or(0),
        description: candidate.description,
    }).await
}

async fn import_variant(catalog: &dyn CatalogStore, row: &SheetRow) -> Result<Upserted> {
    let candidate = VariantRow {
        product: text(row, "product"),
        category: text(row, "category"),
        name: text(row, "name"),
        value: text(row, "value"),
        price_adjustment: number(row, "price_adjustment")?,
        stock: count(row, "stock")?,
    };
    candidate.validate()?;

    let category = candidate.category.unwrap_or_default();
    let product = candidate.product.unwrap_or_default();
    let category_id = catalog.category_id(&category).await?.ok_or_else(|| CommerceError::not_found(format!("category '{category}'")))?;
    let product_id = catalog.product_id(&product, category_id).await?
        .ok_or_else(|| CommerceError::not_found(format!("product '{product}' in category '{category}'")))?;

    catalog.upsert_variant(&VariantRecord {
        product_id,
        name: candidate.name.unwrap_or_default(),
        value: candidate.value.unwrap_or_default(),
        price_adjustment: candidate.price_adjustment.unwrap_or_default(),
        stock: candidate.stock.unwrap_or(0),
    }).await
}

fn text(row: &SheetRow, column: &str) -> Option<String> { row.get(column).map(str::to_string) }

fn number(row: &SheetRow, column: &str) -> Result<Option<Decimal>> {
    row.get(column)
        .map(|raw| Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw)).map_err(|_| CommerceError::validation(format!("{column}: '{raw}' is not a number"))))
        .transpose()
}

fn count(row: &SheetRow, column: &str) -> Result<Option<u32>> {
    row.get(column)
        .map(|raw| raw.parse::<u32>().map_err(|_| CommerceError::validation(format!("{column}: '{raw}' is not a whole number of 0 or more"))))
        .transpose()
}
