//! Spreadsheet catalog import.
//!
//! Each data row is parsed, validated and upserted on its own. A bad row is
//! reported with its number and never stops the rows after it.

pub mod rows;
pub mod sheet;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::aggregates::Upserted;
use crate::store::CatalogStore;
use crate::{CommerceError, Result};

pub use sheet::{create_template, SheetRow};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportKind { Products, Categories, Brands, Variants }

/// Template column; `required` columns must be present in the header row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column { pub name: &'static str, pub required: bool }

const fn col(name: &'static str, required: bool) -> Column { Column { name, required } }

const CATEGORY_COLUMNS: &[Column] = &[col("name", true), col("description", false), col("parent", false)];
const BRAND_COLUMNS: &[Column] = &[col("name", true), col("description", false), col("website", false)];
const PRODUCT_COLUMNS: &[Column] = &[
    col("name", true), col("category", true), col("price", true), col("brand", false),
    col("sku", false), col("stock", false), col("description", false),
];
const VARIANT_COLUMNS: &[Column] = &[
    col("product", true), col("category", true), col("name", true), col("value", true),
    col("price_adjustment", false), col("stock", false),
];

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Products => "products", Self::Categories => "categories", Self::Brands => "brands", Self::Variants => "variants" }
    }

    pub fn columns(&self) -> &'static [Column] {
        match self { Self::Products => PRODUCT_COLUMNS, Self::Categories => CATEGORY_COLUMNS, Self::Brands => BRAND_COLUMNS, Self::Variants => VARIANT_COLUMNS }
    }

    pub fn template_filename(&self) -> String { format!("{}_template.xlsx", self.as_str()) }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl FromStr for ImportKind {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "products" | "product" => Ok(Self::Products),
            "categories" | "category" => Ok(Self::Categories),
            "brands" | "brand" => Ok(Self::Brands),
            "variants" | "variant" | "variations" => Ok(Self::Variants),
            other => Err(CommerceError::validation(format!("unknown import type '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowError { pub row: usize, pub message: String }

/// Batch summary. `success_count + error_count == total_processed`; blank
/// rows only show up in `skipped`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub total_processed: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

impl ImportResult {
    fn record(&mut self, row: usize, outcome: std::result::Result<Upserted, String>) {
        self.total_processed += 1;
        match outcome {
            Ok(Upserted::Created) => { self.success_count += 1; self.created += 1; }
            Ok(Upserted::Updated) => { self.success_count += 1; self.updated += 1; }
            Err(message) => { self.error_count += 1; self.errors.push(RowError { row, message }); }
        }
    }

    fn finish(mut self) -> Self { self.success = self.error_count == 0; self }
}

/// Rejects uploads that are not `.xlsx` or `.xls` before anything is parsed.
pub fn ensure_spreadsheet(filename: &str) -> Result<()> {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
    match extension.as_deref() {
        Some("xlsx" | "xls") => Ok(()),
        _ => Err(CommerceError::validation(format!("'{filename}' is not a spreadsheet, upload an .xlsx or .xls file"))),
    }
}

#[derive(Clone)]
pub struct Importer {
    catalog: Arc<dyn CatalogStore>,
}

impl Importer {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self { Self { catalog } }

    #[instrument(skip(self, bytes), fields(kind = %kind, size = bytes.len()))]
    pub async fn import(&self, kind: ImportKind, filename: &str, bytes: Vec<u8>) -> Result<ImportResult> {
        ensure_spreadsheet(filename)?;
        let (headers, data) = sheet::read_rows(bytes)?;

        let missing: Vec<String> = kind.columns().iter()
            .filter(|c| c.required && !headers.iter().any(|h| h == c.name))
            .map(|c| format!("missing required column '{}'", c.name))
            .collect();
        if !missing.is_empty() { return Err(CommerceError::Validation(missing)); }

        let mut result = ImportResult::default();
        for row in &data {
            if row.is_blank() { result.skipped += 1; continue; }
            let outcome = rows::import_row(self.catalog.as_ref(), kind, row).await;
            if let Err(message) = &outcome { warn!(row = row.number, %message, "import row failed"); }
            result.record(row.number, outcome);
        }

        let result = result.finish();
        info!(processed = result.total_processed, created = result.created, updated = result.updated, failed = result.error_count, "import finished");
        Ok(result)
    }

    pub fn template(&self, kind: ImportKind) -> Result<Vec<u8>> { create_template(kind) }
}
