//! Order Aggregate
//!
//! An order is placed in `PENDING_PAYMENT`, moved to `PAID` or `CANCELLED` by
//! exactly one payment flow, and afterwards only moved by admin fulfillment.
//! Line items and the total never change once the order exists; the only
//! mutation path is [`StatusChange`], which has no access to either.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::value_objects::{Money, Quantity, ReferenceCode};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub gateway_token: Option<String>,
    /// When the checkout session behind `gateway_token` was opened.
    #[serde(skip_serializing)]
    pub gateway_token_at: Option<DateTime<Utc>>,
    pub reference_code: Option<ReferenceCode>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Price snapshot of one product at the time of purchase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItem { pub id: Uuid, pub product_id: String, pub name: Option<String>, pub quantity: Quantity, pub unit_price: Decimal }

impl LineItem {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity.value()) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, message = "full name is required"))]
    pub full_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "address line is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

impl Address {
    /// Single-line rendering used by the gateway's address fields.
    pub fn one_line(&self) -> String {
        [Some(self.line1.as_str()), self.line2.as_deref(), Some(self.city.as_str()), self.state.as_deref(), Some(self.postal_code.as_str())]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { HostedGateway, BankTransfer }

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::HostedGateway => "hosted_gateway", Self::BankTransfer => "bank_transfer" }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hosted_gateway" => Ok(Self::HostedGateway),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Order status. Everything except `Cancelled` sits on one ordered
/// progression, which is what "paid or later" checks compare against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { PendingPayment, Paid, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::PendingPayment, Self::Paid, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::PendingPayment => Some(0),
            Self::Paid => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    pub fn is_paid_or_later(&self) -> bool { self.rank().is_some_and(|r| r >= 1) }

    /// Transition table. Fulfillment may skip forward (`PAID -> DELIVERED`)
    /// but nothing reaches fulfillment without passing through `PAID`.
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            PendingPayment => &[Paid, Cancelled],
            Paid => &[Processing, Shipped, Delivered, Cancelled],
            Processing => &[Shipped, Delivered, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    /// Same-status updates are metadata refreshes (tracking, notes) and always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool { *self == next || self.allowed_next().contains(&next) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|st| st.as_str() == wanted).ok_or_else(|| format!("invalid status '{s}'"))
    }
}

/// Fulfillment metadata an admin may attach alongside a status change.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct StatusExtra {
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// The only mutation an existing order accepts. `None` fields are left untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl StatusChange {
    pub fn to(status: OrderStatus) -> Self {
        Self { status, payment_id: None, tracking_number: None, estimated_delivery_date: None, notes: None }
    }
    pub fn with_extra(mut self, extra: &StatusExtra) -> Self {
        self.tracking_number = extra.tracking_number.clone();
        self.estimated_delivery_date = extra.estimated_delivery_date;
        self.notes = extra.notes.clone();
        self
    }
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self { self.notes = Some(notes.into()); self }
    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self { self.payment_id = Some(payment_id.into()); self }
}

/// Checkout payload as submitted by the client.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CreateOrder {
    #[serde(default)]
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    #[validate(required(message = "total amount is required"), custom = "money_amount")]
    pub total_amount: Option<Decimal>,
    #[validate(required_nested)]
    pub shipping_address: Option<Address>,
    #[validate(required_nested)]
    pub billing_address: Option<Address>,
    #[validate(required(message = "payment method is required"))]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
pub struct OrderItemInput {
    #[validate(required(message = "product id is required"), length(min = 1))]
    pub product_id: Option<String>,
    pub name: Option<String>,
    #[validate(required(message = "quantity is required"), range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: Option<u32>,
    #[validate(required(message = "price is required"), custom = "money_amount")]
    pub price: Option<Decimal>,
}

impl CreateOrder {
    /// Validates the payload and every item, flattening failures into
    /// messages such as `items[2].price: price is required`.
    pub fn check(&self) -> Result<(), Vec<String>> {
        let mut messages = match self.validate() { Ok(()) => Vec::new(), Err(e) => crate::validation_messages(&e) };
        for (idx, item) in self.items.iter().enumerate() {
            if let Err(e) = item.validate() {
                messages.extend(crate::validation_messages(&e).into_iter().map(|m| format!("items[{idx}].{m}")));
            }
        }
        if messages.is_empty() { Ok(()) } else { Err(messages) }
    }
}

/// Amounts are stored as `NUMERIC(14, 2)`: never negative, whole cents.
pub(crate) fn money_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() { return Err(amount_error("negative_amount", "amount must not be negative")); }
    whole_cents(value)
}

/// Signed amounts such as price adjustments still have to fit in cents.
pub(crate) fn whole_cents(value: &Decimal) -> Result<(), ValidationError> {
    if value.normalize().scale() > 2 { return Err(amount_error("sub_cent_amount", "amount must have at most 2 decimal places")); }
    Ok(())
}

fn amount_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

impl Order {
    /// Builds a new order from a checkout payload that already passed
    /// `validate()`. The total is recomputed from the line items and must
    /// match what the client submitted.
    pub fn place(user_id: impl Into<String>, input: &CreateOrder, currency: &str) -> Result<Self, OrderError> {
        let items = &input.items;
        if items.is_empty() { return Err(OrderError::NoItems); }

        let mut line_items = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let (Some(product_id), Some(quantity), Some(unit_price)) = (item.product_id.clone(), item.quantity.and_then(Quantity::new), item.price) else {
                return Err(OrderError::IncompleteItem(idx + 1));
            };
            line_items.push(LineItem { id: Uuid::new_v4(), product_id, name: item.name.clone(), quantity, unit_price });
        }

        let computed = line_items.iter().fold(Money::zero(currency), |acc, i| Money::new(acc.amount() + i.line_total(), currency));
        let submitted = input.total_amount.ok_or(OrderError::MissingField("total_amount"))?;
        if computed.amount() != submitted {
            return Err(OrderError::TotalMismatch { computed: computed.amount(), submitted });
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), user_id: user_id.into(), items: line_items, total_amount: computed.amount(), currency: currency.to_string(),
            shipping_address: input.shipping_address.clone().ok_or(OrderError::MissingField("shipping_address"))?,
            billing_address: input.billing_address.clone().ok_or(OrderError::MissingField("billing_address"))?,
            payment_method: input.payment_method.ok_or(OrderError::MissingField("payment_method"))?,
            payment_id: None, gateway_token: None, gateway_token_at: None, reference_code: None, tracking_number: None,
            estimated_delivery_date: None, notes: None, status: OrderStatus::PendingPayment, created_at: now, updated_at: now,
        })
    }

    pub fn total(&self) -> Money { Money::new(self.total_amount, &self.currency) }

    pub fn check_transition(&self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status.can_transition_to(next) { Ok(()) } else { Err(OrderError::IllegalTransition { from: self.status, to: next }) }
    }

    /// Applies a change in memory. Storage backends that cannot express the
    /// change as a single conditional write use this to stay consistent.
    pub fn apply(&mut self, change: &StatusChange) {
        self.status = change.status;
        if let Some(v) = &change.payment_id { self.payment_id = Some(v.clone()); }
        if let Some(v) = &change.tracking_number { self.tracking_number = Some(v.clone()); }
        if let Some(v) = change.estimated_delivery_date { self.estimated_delivery_date = Some(v); }
        if let Some(v) = &change.notes { self.notes = Some(v.clone()); }
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderError {
    NoItems,
    IncompleteItem(usize),
    MissingField(&'static str),
    TotalMismatch { computed: Decimal, submitted: Decimal },
    IllegalTransition { from: OrderStatus, to: OrderStatus },
}
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "order must contain at least one item"),
            Self::IncompleteItem(n) => write!(f, "item {n} requires product id, quantity and price"),
            Self::MissingField(field) => write!(f, "{field} is required"),
            Self::TotalMismatch { computed, submitted } => write!(f, "total amount {submitted} does not match line items ({computed})"),
            Self::IllegalTransition { from, to } => write!(f, "cannot move order from {from} to {to}"),
        }
    }
}
