//! Domain events
use crate::domain::aggregates::{Order, OrderStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: String, total: Decimal },
    Paid { order_id: Uuid, payment_id: Option<String> },
    Cancelled { order_id: Uuid, reason: Option<String> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    BankTransferInitiated { order_id: Uuid, reference_code: String },
    /// The gateway captured a payment for an order that was already cancelled.
    RefundRequired { order_id: Uuid, payment_id: String },
}

impl OrderEvent {
    /// Event for a stored status change, chosen by the status reached.
    pub fn for_transition(from: OrderStatus, order: &Order) -> Self {
        match order.status {
            OrderStatus::Paid if from == OrderStatus::PendingPayment => Self::Paid { order_id: order.id, payment_id: order.payment_id.clone() },
            OrderStatus::Cancelled if from != OrderStatus::Cancelled => Self::Cancelled { order_id: order.id, reason: order.notes.clone() },
            to => Self::StatusChanged { order_id: order.id, from, to },
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. } | Self::Paid { order_id, .. } | Self::Cancelled { order_id, .. }
            | Self::StatusChanged { order_id, .. } | Self::BankTransferInitiated { order_id, .. }
            | Self::RefundRequired { order_id, .. } => *order_id,
        }
    }

    /// NATS subject, `orders.<event>`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::Paid { .. } => "orders.paid",
            Self::Cancelled { .. } => "orders.cancelled",
            Self::StatusChanged { .. } => "orders.status_changed",
            Self::BankTransferInitiated { .. } => "orders.bank_transfer_initiated",
            Self::RefundRequired { .. } => "orders.refund_required",
        }
    }
}
