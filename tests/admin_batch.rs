mod common;

use common::*;
use opensase_storefront::domain::aggregates::{OrderStatus, StatusExtra};
use opensase_storefront::CommerceError;
use uuid::Uuid;

#[tokio::test]
async fn batch_isolates_missing_orders() {
    let h = harness();
    let mut valid = Vec::new();
    for _ in 0..4 {
        valid.push(h.order("bank_transfer").await.id);
    }
    let missing = [Uuid::new_v4(), Uuid::new_v4()];
    let ids = vec![valid[0], missing[0], valid[1], valid[2], missing[1], valid[3]];

    let outcome = h.state.admin.update_batch(&admin(), &ids, OrderStatus::Paid, None).await.unwrap();

    assert_eq!(outcome.total_failed, 2);
    assert_eq!(outcome.total_updated, 4);
    assert_eq!(outcome.total_updated + outcome.total_failed, ids.len());
    assert!(outcome.errors[0].starts_with(&format!("{}: ", missing[0])));
    assert!(outcome.errors[1].starts_with(&format!("{}: ", missing[1])));
    for id in valid {
        assert_eq!(h.state.orders.get_order_by_id(id).await.unwrap().status, OrderStatus::Paid);
    }
}

#[tokio::test]
async fn batch_reports_illegal_transitions_per_order() {
    let h = harness();
    let pending = h.order("bank_transfer").await;
    let paid = h.order("bank_transfer").await;
    h.state.orders.update_status(paid.id, OrderStatus::Paid, None).await.unwrap();

    let extra = StatusExtra { tracking_number: Some("TRK-9".into()), ..Default::default() };
    let outcome = h.state.admin.update_batch(&admin(), &[pending.id, paid.id], OrderStatus::Shipped, Some(&extra)).await.unwrap();

    assert_eq!((outcome.total_updated, outcome.total_failed), (1, 1));
    assert_eq!(outcome.updated[0].id, paid.id);
    assert_eq!(outcome.updated[0].tracking_number.as_deref(), Some("TRK-9"));
    assert!(outcome.errors[0].contains("PENDING_PAYMENT"));
}

#[tokio::test]
async fn console_requires_admin() {
    let h = harness();
    let order = h.order("bank_transfer").await;

    let err = h.state.admin.update_single(&customer(), order.id, OrderStatus::Paid, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::Forbidden(_)));
    let err = h.state.admin.update_batch(&customer(), &[order.id], OrderStatus::Paid, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::Forbidden(_)));
    assert_eq!(h.state.orders.get_order_by_id(order.id).await.unwrap().status, OrderStatus::PendingPayment);
}
