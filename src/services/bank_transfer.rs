//! Manual bank transfer flow.
//!
//! The buyer wires the order total quoting a reference code; an operator
//! matches statement lines against codes and confirms or cancels the order.
//! Nothing here verifies the bank transaction itself: the operator's
//! decision is taken as is.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::BankAccount;
use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod, StatusChange};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, ReferenceCode};
use crate::services::{Caller, EventPublisher, OrderService};
use crate::{CommerceError, Result};

const MAX_CODE_ATTEMPTS: usize = 5;

/// What the buyer needs to make the transfer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BankTransferInstructions {
    pub order_id: Uuid,
    pub reference_code: ReferenceCode,
    pub amount: Money,
    pub account: BankAccount,
}

#[derive(Clone)]
pub struct BankTransfers {
    orders: OrderService,
    events: EventPublisher,
    account: BankAccount,
}

impl BankTransfers {
    pub fn new(orders: OrderService, events: EventPublisher, account: BankAccount) -> Self { Self { orders, events, account } }

    /// Assigns a reference code to a pending bank-transfer order. Calling it
    /// again returns the code already assigned.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn initiate_bank_transfer(&self, caller: &Caller, order_id: Uuid) -> Result<BankTransferInstructions> {
        let order = self.orders.get_order_for(caller, order_id).await?;
        ensure_bank_transfer(&order)?;
        if let Some(code) = order.reference_code.clone() {
            return Ok(self.instructions(&order, code));
        }
        if order.status != OrderStatus::PendingPayment {
            return Err(CommerceError::InvalidTransition { from: order.status, to: OrderStatus::Paid });
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = ReferenceCode::generate(&mut rand::thread_rng());
            match self.orders.store().assign_reference_code(order.id, &code).await {
                Ok(Some(updated)) => {
                    let code = updated.reference_code.clone().unwrap_or(code);
                    info!(reference_code = %code, "bank transfer initiated");
                    self.events.publish(OrderEvent::BankTransferInitiated { order_id: order.id, reference_code: code.to_string() }).await;
                    return Ok(self.instructions(&updated, code));
                }
                Ok(None) => {
                    // Raced with another initiation or a status change; report what is stored now.
                    let current = self.orders.get_order_by_id(order.id).await?;
                    return match current.reference_code.clone() {
                        Some(code) => Ok(self.instructions(&current, code)),
                        None => Err(CommerceError::Conflict(format!("order {} is no longer awaiting payment", order.id))),
                    };
                }
                Err(CommerceError::ReferenceTaken) => warn!(attempt, "reference code collision, retrying"),
                Err(e) => return Err(e),
            }
        }
        Err(CommerceError::Internal(format!("no free reference code after {MAX_CODE_ATTEMPTS} attempts")))
    }

    /// Admin decision after reading the bank statement.
    #[instrument(skip(self, caller, notes), fields(order_id = %order_id, decision = %decision))]
    pub async fn confirm_bank_transfer(&self, caller: &Caller, order_id: Uuid, decision: OrderStatus, notes: Option<String>) -> Result<Order> {
        caller.require_admin()?;
        if !matches!(decision, OrderStatus::Paid | OrderStatus::Cancelled) {
            return Err(CommerceError::validation("decision must be PAID or CANCELLED"));
        }

        let order = self.orders.get_order_by_id(order_id).await?;
        ensure_bank_transfer(&order)?;
        if order.status != OrderStatus::PendingPayment {
            return Err(CommerceError::InvalidTransition { from: order.status, to: decision });
        }

        let mut change = StatusChange::to(decision);
        if let Some(notes) = notes { change = change.with_notes(notes); }
        let updated = self.orders.transition(&order, change).await?;
        info!(confirmed_by = %caller.user_id, "bank transfer reconciled");
        Ok(updated)
    }

    fn instructions(&self, order: &Order, reference_code: ReferenceCode) -> BankTransferInstructions {
        BankTransferInstructions { order_id: order.id, reference_code, amount: order.total(), account: self.account.clone() }
    }
}

fn ensure_bank_transfer(order: &Order) -> Result<()> {
    if order.payment_method == PaymentMethod::BankTransfer { Ok(()) } else { Err(CommerceError::validation("order is not a bank transfer order")) }
}
