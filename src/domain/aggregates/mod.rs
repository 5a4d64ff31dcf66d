//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{BrandRecord, CategoryRecord, ProductRecord, Upserted, VariantRecord};
pub use order::{Address, CreateOrder, LineItem, Order, OrderError, OrderItemInput, OrderStatus, PaymentMethod, StatusChange, StatusExtra};
pub use cart::{Cart, CartError, CartItem};
