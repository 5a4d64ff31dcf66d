//! Cart Aggregate
//!
//! The cart lives on the client (local storage); the server never persists
//! it. It is kept here so totals are computed the same way on both sides and
//! so checkout payloads are built in one place.

use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::{Address, CreateOrder, OrderItemInput, PaymentMethod};
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
    currency: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity.value()) }
}

impl Cart {
    pub fn new(currency: &str) -> Self { Self { items: vec![], currency: currency.to_string() } }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Sum of every line total. Items priced in another currency are refused at insert time.
    pub fn subtotal(&self) -> Money {
        self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc))
    }

    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.unit_price.currency() != self.currency { return Err(CartError::CurrencyMismatch); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            let merged = existing.quantity.value().saturating_add(item.quantity.value());
            existing.quantity = Quantity::new(merged).unwrap_or(existing.quantity);
            existing.unit_price = item.unit_price;
        } else {
            self.items.push(item);
        }
        Ok(())
    }

    /// Setting quantity to zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        match Quantity::new(quantity) {
            Some(q) => item.quantity = q,
            None => self.items.retain(|i| i.product_id != product_id),
        }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }

    /// Builds the checkout request, snapshotting current prices into the line items.
    pub fn to_checkout(&self, shipping: Address, billing: Address, payment_method: PaymentMethod) -> CreateOrder {
        CreateOrder {
            items: self.items.iter().map(|i| OrderItemInput {
                product_id: Some(i.product_id.clone()),
                name: Some(i.name.clone()),
                quantity: Some(i.quantity.value()),
                price: Some(i.unit_price.amount()),
            }).collect(),
            total_amount: Some(self.subtotal().amount()),
            shipping_address: Some(shipping),
            billing_address: Some(billing),
            payment_method: Some(payment_method),
        }
    }

    pub fn total_quantity(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, CurrencyMismatch }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ItemNotFound => write!(f, "Item not found"), Self::CurrencyMismatch => write!(f, "Item priced in a different currency") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn widget(qty: u32) -> CartItem {
        CartItem { product_id: "P1".into(), name: "Widget".into(), quantity: Quantity::new(qty).unwrap(), unit_price: Money::new(Decimal::new(10, 0), "USD") }
    }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new("USD");
        cart.add_item(widget(2)).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.subtotal().amount(), Decimal::new(20, 0));
        cart.add_item(widget(1)).unwrap();
        assert_eq!(cart.items()[0].quantity.value(), 3); // Merged
        cart.update_quantity("P1", 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item("P1"), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_foreign_currency_refused() {
        let mut cart = Cart::new("USD");
        let mut item = widget(1);
        item.unit_price = Money::new(Decimal::new(10, 0), "EUR");
        assert_eq!(cart.add_item(item), Err(CartError::CurrencyMismatch));
    }

    #[test]
    fn test_checkout_payload_matches_subtotal() {
        let mut cart = Cart::new("USD");
        cart.add_item(widget(2)).unwrap();
        cart.add_item(CartItem { product_id: "P2".into(), name: "Gadget".into(), quantity: Quantity::new(1).unwrap(), unit_price: Money::new(Decimal::new(30, 0), "USD") }).unwrap();
        let payload = cart.to_checkout(Address::default(), Address::default(), PaymentMethod::BankTransfer);
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.total_amount, Some(Decimal::new(50, 0)));
        assert_eq!(cart.total_quantity(), 3);
    }
}
