//! OpenSASE Storefront
//!
//! Order, payment and catalog-import core of a server-rendered storefront.
//!
//! ## Features
//! - Checkout into a `PENDING_PAYMENT` order with server-side total verification
//! - Hosted payment gateway flow (redirect, verified callback, stale-order sweep)
//! - Manual bank-transfer flow keyed by a human-readable reference code
//! - Admin status console with an explicit transition table and batch updates
//! - Spreadsheet catalog import with per-row failure isolation

pub mod config;
pub mod domain;
pub mod http;
pub mod import;
pub mod services;
pub mod store;

use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::domain::aggregates::{OrderError, OrderStatus};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Reference code already in use")]
    ReferenceTaken,

    #[error("Unreadable spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(vec![message.into()]) }
    pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }
}

impl From<OrderError> for CommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::IllegalTransition { from, to } => Self::InvalidTransition { from, to },
            other => Self::validation(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for CommerceError {
    fn from(e: ValidationErrors) -> Self { Self::Validation(validation_messages(&e)) }
}

pub type Result<T> = std::result::Result<T, CommerceError>;

/// Flattens `validator` output into `field: message` lines, nested fields
/// joined with `.` and list entries indexed (`items[0].price`).
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut out = Vec::new();
    collect_messages(errors, "", &mut out);
    out.sort();
    out
}

fn collect_messages(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { (*field).to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    let text = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                    out.push(format!("{path}: {text}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_messages(inner, &path, out),
            ValidationErrorsKind::List(entries) => {
                for (idx, inner) in entries {
                    collect_messages(inner, &format!("{path}[{idx}]"), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Inner {
        #[validate(length(min = 1, message = "city is required"))]
        city: String,
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(range(min = 1))]
        quantity: u32,
        #[validate]
        address: Inner,
    }

    #[test]
    fn test_validation_messages_flatten_nested() {
        let errors = Outer { quantity: 0, address: Inner { city: String::new() } }.validate().unwrap_err();
        assert_eq!(validation_messages(&errors), vec!["address.city: city is required".to_string(), "quantity: range".to_string()]);
    }

    #[test]
    fn test_order_error_mapping() {
        let err: CommerceError = OrderError::IllegalTransition { from: OrderStatus::Cancelled, to: OrderStatus::Paid }.into();
        assert!(matches!(err, CommerceError::InvalidTransition { .. }));
        let err: CommerceError = OrderError::NoItems.into();
        assert!(matches!(err, CommerceError::Validation(ref m) if m.len() == 1));
    }
}
