//! Hosted gateway payment flow.
//!
//! `PENDING_PAYMENT` → buyer redirected to the gateway → callback → `PAID` or
//! `CANCELLED`. The callback body is never trusted: the result is always
//! fetched from the gateway by token, and the token has to be the one the
//! gateway issued for this order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Address, Order, OrderStatus, PaymentMethod, StatusChange};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::Money;
use crate::services::gateway::{BasketItem, Buyer, CheckoutRequest, GatewayAddress, PaymentGateway, PaymentResult};
use crate::services::{Caller, OrderService};
use crate::{CommerceError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const INSUFFICIENT_FUNDS: &str = "NOT_SUFFICIENT_FUNDS";

/// Buyer identity the gateway requires alongside the order.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct BuyerInfo {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "surname is required"))]
    pub surname: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    /// Falls back to the user id when the storefront does not collect one.
    pub identity_number: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Initiated {
    pub order_id: Uuid,
    pub redirect_url: String,
}

/// Coarse reason shown on the failure page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason { ProcessError, Rejected, InsufficientFunds, Unknown }

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessError => "process-error",
            Self::Rejected => "rejected",
            Self::InsufficientFunds => "insufficient-funds",
            Self::Unknown => "unknown",
        }
    }

    fn classify(result: &PaymentResult) -> Self {
        if result.status != "success" { return Self::ProcessError; }
        match result.error_group.as_deref() {
            Some(INSUFFICIENT_FUNDS) => Self::InsufficientFunds,
            Some(_) => Self::Rejected,
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Succeeded { order_id: Uuid },
    Failed { order_id: Uuid, reason: FailureReason },
}

impl CallbackOutcome {
    fn for_order(order: &Order) -> Self {
        if order.status.is_paid_or_later() {
            Self::Succeeded { order_id: order.id }
        } else {
            Self::Failed { order_id: order.id, reason: FailureReason::Unknown }
        }
    }

    /// Storefront page the buyer lands on after the callback.
    pub fn redirect_target(&self, base_url: &str) -> String {
        match self {
            Self::Succeeded { order_id } => format!("{base_url}/checkout/success?order_id={order_id}"),
            Self::Failed { order_id, reason } => format!("{base_url}/checkout/failure?order_id={order_id}&reason={reason}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub paid: usize,
    pub cancelled: usize,
    pub left_pending: usize,
}

#[derive(Clone)]
pub struct HostedCheckout {
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    public_base_url: String,
    timeout: Duration,
}

impl HostedCheckout {
    pub fn new(orders: OrderService, gateway: Arc<dyn PaymentGateway>, public_base_url: impl Into<String>) -> Self {
        Self { orders, gateway, public_base_url: public_base_url.into(), timeout: DEFAULT_TIMEOUT }
    }

    /// Upper bound on any single gateway call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self { self.timeout = timeout; self }

    pub fn public_base_url(&self) -> &str { &self.public_base_url }

    /// Opens a gateway session for a pending order and returns the payment page.
    ///
    /// A refusal by the gateway cancels the order. A transport failure or
    /// timeout leaves it pending, since the session may exist on the gateway
    /// side; [`HostedCheckout::reconcile_stale`] settles it later.
    #[instrument(skip(self, caller, buyer), fields(order_id = %order_id))]
    pub async fn initiate(&self, caller: &Caller, order_id: Uuid, buyer: &BuyerInfo) -> Result<Initiated> {
        buyer.validate()?;
        let order = self.orders.get_order_for(caller, order_id).await?;
        if order.payment_method != PaymentMethod::HostedGateway {
            return Err(CommerceError::validation("order is not a hosted gateway order"));
        }
        if order.status != OrderStatus::PendingPayment {
            return Err(CommerceError::InvalidTransition { from: order.status, to: OrderStatus::Paid });
        }

        let request = self.checkout_request(&order, buyer);
        let session = match self.bounded(self.gateway.initialize(&request)).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "gateway initialization did not complete, order left pending");
                return Err(e);
            }
        };

        if let Some((token, page)) = session.redirect() {
            self.orders.store().record_gateway_token(order.id, token).await?;
            info!("hosted checkout session opened");
            return Ok(Initiated { order_id: order.id, redirect_url: page.to_string() });
        }

        let reason = session.error_message.clone().or(session.error_code.clone()).unwrap_or_else(|| "no payment page returned".into());
        warn!(%reason, "gateway refused checkout session");
        let change = StatusChange::to(OrderStatus::Cancelled).with_notes(format!("Payment initialization failed: {reason}"));
        if let Err(e) = self.orders.transition(&order, change).await {
            warn!(error = %e, "could not cancel order after refused initialization");
        }
        Err(CommerceError::Gateway(reason))
    }

    /// Settles an order from the gateway's authoritative result. Repeated
    /// callbacks for a settled order return the same outcome. The one write
    /// on a settled order records a payment captured after cancellation.
    #[instrument(skip(self, token), fields(order_id = %order_id))]
    pub async fn handle_callback(&self, order_id: Uuid, token: &str) -> Result<CallbackOutcome> {
        let order = self.orders.get_order_by_id(order_id).await?;
        if order.status != OrderStatus::PendingPayment {
            info!(status = %order.status, "callback for settled order ignored");
            if order.status == OrderStatus::Cancelled && order.payment_id.is_none() && order.gateway_token.as_deref() == Some(token) {
                self.check_capture_after_cancel(&order, token).await;
            }
            return Ok(CallbackOutcome::for_order(&order));
        }
        if order.payment_method != PaymentMethod::HostedGateway {
            return Err(CommerceError::validation("order is not a hosted gateway order"));
        }
        if order.gateway_token.as_deref() != Some(token) {
            return Err(CommerceError::validation("callback token does not belong to this order"));
        }

        let result = match self.bounded(self.gateway.retrieve(token)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "could not retrieve payment result, order left pending");
                return Ok(CallbackOutcome::Failed { order_id, reason: FailureReason::ProcessError });
            }
        };
        self.settle(&order, &result).await
    }

    /// Settles hosted gateway orders stuck in `PENDING_PAYMENT` for longer
    /// than `max_age`. Only a paid or definitively declined result changes an
    /// order; a session the buyer may still be on stays pending.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(&self, max_age: Duration) -> Result<ReconcileReport> {
        let max_age = chrono::Duration::from_std(max_age).map_err(|e| CommerceError::Internal(format!("invalid reconcile age: {e}")))?;
        let stale = self.orders.store().stale_pending(PaymentMethod::HostedGateway, Utc::now() - max_age).await?;

        let mut report = ReconcileReport { checked: stale.len(), ..Default::default() };
        for order in stale {
            let outcome = match order.gateway_token.as_deref() {
                None => {
                    let change = StatusChange::to(OrderStatus::Cancelled).with_notes("Payment was never initiated");
                    self.orders.transition(&order, change).await.map(|o| Some(CallbackOutcome::for_order(&o)))
                }
                Some(token) => match self.bounded(self.gateway.retrieve(token)).await {
                    Ok(result) if result.is_paid() || result.is_declined() => self.settle(&order, &result).await.map(Some),
                    Ok(result) => {
                        info!(order_id = %order.id, status = %result.status, payment_status = ?result.payment_status, "gateway session still open");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                },
            };

            match outcome {
                Ok(Some(CallbackOutcome::Succeeded { .. })) => report.paid += 1,
                Ok(Some(CallbackOutcome::Failed { .. })) => report.cancelled += 1,
                Ok(None) => report.left_pending += 1,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "stale order left pending");
                    report.left_pending += 1;
                }
            }
        }

        if report.checked > 0 { info!(?report, "stale gateway orders reconciled"); }
        Ok(report)
    }

    async fn settle(&self, order: &Order, result: &PaymentResult) -> Result<CallbackOutcome> {
        if result.status == "success" && result.conversation_id.as_deref() != Some(order.id.to_string().as_str()) {
            return Err(CommerceError::validation("payment result belongs to a different order"));
        }

        let (change, outcome) = if result.is_paid() {
            let Some(payment_id) = result.payment_id.clone() else {
                warn!(order_id = %order.id, "paid result carries no payment id, order left pending");
                return Err(CommerceError::Gateway("payment result has no payment id".into()));
            };
            (StatusChange::to(OrderStatus::Paid).with_payment_id(payment_id), CallbackOutcome::Succeeded { order_id: order.id })
        } else {
            let reason = FailureReason::classify(result);
            let notes = format!("Payment failed ({reason}): {}", result.failure_message());
            (StatusChange::to(OrderStatus::Cancelled).with_notes(notes), CallbackOutcome::Failed { order_id: order.id, reason })
        };

        match self.orders.transition(order, change).await {
            Ok(_) => Ok(outcome),
            Err(CommerceError::Conflict(_)) => {
                let current = self.orders.get_order_by_id(order.id).await?;
                info!(order_id = %order.id, status = %current.status, "order settled concurrently");
                if current.status == OrderStatus::Cancelled && current.payment_id.is_none() && result.is_paid() {
                    self.flag_refund(&current, result).await;
                }
                Ok(CallbackOutcome::for_order(&current))
            }
            Err(e) => Err(e),
        }
    }

    async fn check_capture_after_cancel(&self, order: &Order, token: &str) {
        match self.bounded(self.gateway.retrieve(token)).await {
            Ok(result) if result.is_paid() && result.conversation_id.as_deref() == Some(order.id.to_string().as_str()) => {
                self.flag_refund(order, &result).await;
            }
            Ok(_) => {}
            Err(e) => warn!(order_id = %order.id, error = %e, "could not check cancelled order for a late payment"),
        }
    }

    /// Records a payment the gateway captured after the order was cancelled
    /// so it can be refunded. The order stays `CANCELLED`.
    async fn flag_refund(&self, order: &Order, result: &PaymentResult) {
        let payment_id = result.payment_id.clone().unwrap_or_else(|| "unknown".into());
        error!(order_id = %order.id, %payment_id, "payment captured for a cancelled order, refund required");

        let change = StatusChange::to(OrderStatus::Cancelled)
            .with_payment_id(payment_id.clone())
            .with_notes(format!("Payment {payment_id} was captured after cancellation; refund required"));
        if let Err(e) = self.orders.transition(order, change).await {
            warn!(order_id = %order.id, error = %e, "could not record late payment on cancelled order");
        }
        self.orders.events().publish(OrderEvent::RefundRequired { order_id: order.id, payment_id }).await;
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CommerceError::Gateway(format!("gateway did not answer within {:?}", self.timeout)))?
    }

    fn checkout_request(&self, order: &Order, buyer: &BuyerInfo) -> CheckoutRequest {
        let total = order.total().to_gateway_string();
        let basket_items = order.items.iter().map(|item| BasketItem {
            id: item.product_id.clone(),
            name: item.name.clone().unwrap_or_else(|| item.product_id.clone()),
            category1: "General".into(),
            item_type: "PHYSICAL".into(),
            price: Money::new(item.line_total(), &order.currency).to_gateway_string(),
        }).collect();

        let shipping = &order.shipping_address;
        CheckoutRequest {
            conversation_id: order.id.to_string(),
            price: total.clone(),
            paid_price: total,
            currency: order.currency.clone(),
            basket_id: order.id.to_string(),
            basket_items,
            buyer: Buyer {
                id: order.user_id.clone(),
                name: buyer.name.clone(),
                surname: buyer.surname.clone(),
                email: buyer.email.clone(),
                identity_number: buyer.identity_number.clone().unwrap_or_else(|| order.user_id.clone()),
                gsm_number: buyer.phone.clone().or_else(|| shipping.phone.clone()),
                registration_address: shipping.one_line(),
                city: shipping.city.clone(),
                country: shipping.country.clone(),
                zip_code: shipping.postal_code.clone(),
                ip: buyer.ip.clone().unwrap_or_else(|| "127.0.0.1".into()),
            },
            shipping_address: gateway_address(shipping),
            billing_address: gateway_address(&order.billing_address),
            callback_url: format!("{}/api/v1/payments/callback?order_id={}", self.public_base_url, order.id),
        }
    }
}

fn gateway_address(address: &Address) -> GatewayAddress {
    GatewayAddress {
        contact_name: address.full_name.clone(),
        city: address.city.clone(),
        country: address.country.clone(),
        address: address.one_line(),
        zip_code: address.postal_code.clone(),
    }
}
