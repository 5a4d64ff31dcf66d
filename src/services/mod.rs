//! Application services: order lifecycle, payment flows, admin console.

pub mod admin;
pub mod bank_transfer;
pub mod checkout;
pub mod events;
pub mod gateway;
pub mod orders;

pub use admin::{AdminConsole, BatchOutcome};
pub use bank_transfer::{BankTransferInstructions, BankTransfers};
pub use checkout::{BuyerInfo, CallbackOutcome, FailureReason, HostedCheckout, Initiated, ReconcileReport};
pub use events::EventPublisher;
pub use gateway::{HttpGateway, PaymentGateway};
pub use orders::OrderService;

use serde::Serialize;

use crate::domain::aggregates::Order;
use crate::{CommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Customer, Admin }

/// Identity of the authenticated caller, as asserted by the auth provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn customer(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::Customer } }
    pub fn admin(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::Admin } }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(CommerceError::Forbidden("admin role required".into())) }
    }

    pub fn can_access(&self, order: &Order) -> bool { self.is_admin() || order.user_id == self.user_id }
}
