//! Order lifecycle service.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{CreateOrder, Order, OrderStatus, StatusChange, StatusExtra};
use crate::domain::events::OrderEvent;
use crate::services::{Caller, EventPublisher};
use crate::store::{OrderFilter, OrderStore};
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    events: EventPublisher,
    currency: String,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, events: EventPublisher, currency: impl Into<String>) -> Self {
        Self { store, events, currency: currency.into() }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> { &self.store }

    pub(crate) fn events(&self) -> &EventPublisher { &self.events }

    /// Validates the checkout payload, recomputes the total and persists the
    /// order with its items in `PENDING_PAYMENT`.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, user_id: &str, input: &CreateOrder) -> Result<Order> {
        input.check().map_err(CommerceError::Validation)?;
        let order = Order::place(user_id, input, &self.currency)?;
        self.store.insert_order(&order).await?;

        info!(order_id = %order.id, total = %order.total(), "order created");
        self.events.publish(OrderEvent::Created { order_id: order.id, user_id: order.user_id.clone(), total: order.total_amount }).await;
        Ok(order)
    }

    pub async fn get_order_by_id(&self, id: Uuid) -> Result<Order> {
        self.store.find_order(id).await?.ok_or_else(|| CommerceError::not_found(format!("order {id}")))
    }

    /// Owner-or-admin read.
    pub async fn get_order_for(&self, caller: &Caller, id: Uuid) -> Result<Order> {
        let order = self.get_order_by_id(id).await?;
        if !caller.can_access(&order) {
            return Err(CommerceError::Forbidden(format!("order {id} belongs to another user")));
        }
        Ok(order)
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> { self.store.list_orders(filter).await }

    /// Non-admin callers only ever see their own orders, whatever the filter says.
    pub async fn list_orders_for(&self, caller: &Caller, mut filter: OrderFilter) -> Result<Vec<Order>> {
        if !caller.is_admin() { filter.user_id = Some(caller.user_id.clone()); }
        self.list_orders(&filter).await
    }

    #[instrument(skip(self, extra), fields(order_id = %id, status = %new_status))]
    pub async fn update_status(&self, id: Uuid, new_status: OrderStatus, extra: Option<&StatusExtra>) -> Result<Order> {
        if let Some(extra) = extra { extra.validate()?; }
        let order = self.get_order_by_id(id).await?;
        order.check_transition(new_status)?;

        let change = match extra {
            Some(extra) => StatusChange::to(new_status).with_extra(extra),
            None => StatusChange::to(new_status),
        };
        self.transition(&order, change).await
    }

    /// Customer cancellation, allowed until fulfillment starts.
    #[instrument(skip(self, caller), fields(order_id = %id, user_id = %caller.user_id))]
    pub async fn cancel_order(&self, caller: &Caller, id: Uuid) -> Result<Order> {
        let order = self.get_order_for(caller, id).await?;
        if order.status == OrderStatus::Cancelled { return Ok(order); }
        if !caller.is_admin() && !matches!(order.status, OrderStatus::PendingPayment | OrderStatus::Paid) {
            return Err(CommerceError::InvalidTransition { from: order.status, to: OrderStatus::Cancelled });
        }
        order.check_transition(OrderStatus::Cancelled)?;
        self.transition(&order, StatusChange::to(OrderStatus::Cancelled).with_notes("cancelled by customer")).await
    }

    /// Writes `change` only if the order is still in the status it was read
    /// in. Losing a race surfaces as `Conflict` instead of overwriting.
    pub(crate) async fn transition(&self, order: &Order, change: StatusChange) -> Result<Order> {
        match self.store.update_status(order.id, order.status, &change).await? {
            Some(updated) => {
                info!(order_id = %order.id, from = %order.status, to = %updated.status, "order status updated");
                self.events.publish(OrderEvent::for_transition(order.status, &updated)).await;
                Ok(updated)
            }
            None => {
                warn!(order_id = %order.id, expected = %order.status, wanted = %change.status, "conditional status update lost a race");
                Err(CommerceError::Conflict(format!("order {} was modified concurrently", order.id)))
            }
        }
    }
}
