//! Runs against a live database when `DATABASE_URL` is set; otherwise each
//! test returns early.

mod common;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use common::checkout;
use opensase_storefront::domain::aggregates::{BrandRecord, CategoryRecord, Order, OrderStatus, StatusChange, Upserted};
use opensase_storefront::domain::value_objects::ReferenceCode;
use opensase_storefront::store::{CatalogStore, OrderStore, PgStore};
use opensase_storefront::CommerceError;

async fn store() -> Option<(PgStore, PgPool)> {
    let Ok(url) = std::env::var("DATABASE_URL") else { return None };
    let pool = PgPool::connect(&url).await.unwrap();
    let store = PgStore::new(pool.clone());
    store.migrate().await.unwrap();
    Some((store, pool))
}

fn order(payment_method: &str) -> Order {
    Order::place(format!("user-{}", Uuid::new_v4()), &checkout(payment_method), "TRY").unwrap()
}

#[tokio::test]
async fn failed_item_insert_leaves_no_order() {
    let Some((store, pool)) = store().await else { return };
    let mut order = order("hosted_gateway");
    order.items[1].unit_price = Decimal::from(-1);

    assert!(store.insert_order(&order).await.is_err());
    assert!(store.find_order(order.id).await.unwrap().is_none());
    let items: i64 = sqlx::query_scalar("SELECT count(*) FROM order_items WHERE order_id = $1")
        .bind(order.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(items, 0);
}

#[tokio::test]
async fn status_update_requires_expected_status() {
    let Some((store, _pool)) = store().await else { return };
    let order = order("hosted_gateway");
    store.insert_order(&order).await.unwrap();

    let stale = store.update_status(order.id, OrderStatus::Paid, &StatusChange::to(OrderStatus::Processing)).await.unwrap();
    assert!(stale.is_none());

    let paid = StatusChange::to(OrderStatus::Paid).with_payment_id("pay-1");
    let updated = store.update_status(order.id, OrderStatus::PendingPayment, &paid).await.unwrap().unwrap();
    assert_eq!(updated.status, OrderStatus::Paid);
    assert_eq!(updated.payment_id.as_deref(), Some("pay-1"));
    assert_eq!(updated.items.len(), 2);

    let again = store.update_status(order.id, OrderStatus::PendingPayment, &paid).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn duplicate_reference_code_is_reported() {
    let Some((store, _pool)) = store().await else { return };
    let first = order("bank_transfer");
    let second = order("bank_transfer");
    store.insert_order(&first).await.unwrap();
    store.insert_order(&second).await.unwrap();

    let code = ReferenceCode::generate(&mut rand::thread_rng());
    let assigned = store.assign_reference_code(first.id, &code).await.unwrap().unwrap();
    assert_eq!(assigned.reference_code.as_ref(), Some(&code));

    let err = store.assign_reference_code(second.id, &code).await.unwrap_err();
    assert!(matches!(err, CommerceError::ReferenceTaken));
    assert!(store.find_order(second.id).await.unwrap().unwrap().reference_code.is_none());
}

#[tokio::test]
async fn upserts_report_created_then_updated() {
    let Some((store, _pool)) = store().await else { return };
    let suffix = Uuid::new_v4().simple().to_string();

    let category = CategoryRecord { name: format!("Lamps {suffix}"), description: None, parent_id: None };
    assert_eq!(store.upsert_category(&category).await.unwrap(), Upserted::Created);
    let renamed = CategoryRecord { name: format!("  LAMPS   {suffix} "), description: Some("Desk and floor".into()), parent_id: None };
    assert_eq!(store.upsert_category(&renamed).await.unwrap(), Upserted::Updated);
    assert!(store.category_id(&category.name).await.unwrap().is_some());

    let brand = BrandRecord { name: format!("Lumen {suffix}"), description: None, website: None };
    assert_eq!(store.upsert_brand(&brand).await.unwrap(), Upserted::Created);
    assert_eq!(store.upsert_brand(&brand).await.unwrap(), Upserted::Updated);
}
