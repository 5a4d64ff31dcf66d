//! Admin status console.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, StatusExtra};
use crate::services::{Caller, OrderService};
use crate::Result;

/// Per-order breakdown of a batch update. `total_updated + total_failed`
/// always equals the number of ids submitted.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub updated: Vec<Order>,
    pub errors: Vec<String>,
    pub total_updated: usize,
    pub total_failed: usize,
}

#[derive(Clone)]
pub struct AdminConsole {
    orders: OrderService,
}

impl AdminConsole {
    pub fn new(orders: OrderService) -> Self { Self { orders } }

    pub async fn update_single(&self, caller: &Caller, id: Uuid, status: OrderStatus, extra: Option<&StatusExtra>) -> Result<Order> {
        caller.require_admin()?;
        self.orders.update_status(id, status, extra).await
    }

    /// Applies the same status to each order in turn. A failing order is
    /// recorded as `"<id>: <reason>"` and the rest are still processed.
    #[instrument(skip(self, caller, ids, extra), fields(count = ids.len(), status = %status))]
    pub async fn update_batch(&self, caller: &Caller, ids: &[Uuid], status: OrderStatus, extra: Option<&StatusExtra>) -> Result<BatchOutcome> {
        caller.require_admin()?;

        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.orders.update_status(*id, status, extra).await {
                Ok(order) => outcome.updated.push(order),
                Err(e) => {
                    warn!(order_id = %id, error = %e, "batch status update failed for order");
                    outcome.errors.push(format!("{id}: {e}"));
                }
            }
        }
        outcome.total_updated = outcome.updated.len();
        outcome.total_failed = outcome.errors.len();

        info!(updated = outcome.total_updated, failed = outcome.total_failed, "batch status update finished");
        Ok(outcome)
    }
}
