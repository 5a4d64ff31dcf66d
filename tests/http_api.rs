mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use opensase_storefront::http::router;

fn app(h: &Harness) -> Router { router(h.state.clone()) }

fn request(method: &str, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder.header("x-user-id", id).header("x-user-role", role);
    }
    match body {
        Some(json) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(h).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

const CUSTOMER: Option<(&str, &str)> = Some(("user-1", "customer"));
const ADMIN: Option<(&str, &str)> = Some(("admin-1", "admin"));

fn checkout_body() -> Value {
    json!({
        "items": [
            {"product_id": "p1", "quantity": 2, "price": 50},
            {"product_id": "p2", "quantity": 1, "price": 30}
        ],
        "total_amount": 130,
        "shipping_address": address(),
        "billing_address": address(),
        "payment_method": "hosted_gateway"
    })
}

#[tokio::test]
async fn health() {
    let h = harness();
    let (status, body) = send(&h, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn order_endpoints_enforce_auth_and_ownership() {
    let h = harness();
    let (status, body) = send(&h, request("GET", "/api/v1/orders", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, order) = send(&h, request("POST", "/api/v1/orders", CUSTOMER, Some(checkout_body()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING_PAYMENT");
    assert_eq!(order["user_id"], "user-1");
    assert!(order.get("gateway_token").is_none());
    let id = order["id"].as_str().unwrap().to_string();

    let (status, _) = send(&h, request("GET", &format!("/api/v1/orders/{id}"), Some(("user-2", "customer")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("GET", &format!("/api/v1/orders/{id}"), ADMIN, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h, request("GET", &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()), ADMIN, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = send(&h, request("GET", "/api/v1/orders?status=PENDING_PAYMENT", CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_order_reports_missing_fields() {
    let h = harness();
    let body = json!({"items": [{"product_id": "p1", "quantity": 1}], "total_amount": 10, "payment_method": "bank_transfer"});
    let (status, body) = send(&h, request("POST", "/api/v1/orders", CUSTOMER, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let messages: Vec<&str> = body["messages"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert!(messages.contains(&"items[0].price: price is required"), "{messages:?}");
    assert!(messages.iter().any(|m| m.starts_with("shipping_address")), "{messages:?}");
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn admin_status_updates() {
    let h = harness();
    let first = h.order("bank_transfer").await;
    let second = h.order("bank_transfer").await;

    let uri = format!("/api/v1/admin/orders/{}/status", first.id);
    let (status, _) = send(&h, request("PUT", &uri, ADMIN, Some(json!({"status": "LOST"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&h, request("PUT", &uri, CUSTOMER, Some(json!({"status": "PAID"})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("PUT", &uri, CUSTOMER, Some(json!({"status": "LOST"})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("PUT", "/api/v1/admin/orders/not-a-uuid/status", CUSTOMER, Some(json!({"status": 7})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("PUT", "/api/v1/admin/orders/status", CUSTOMER, Some(json!({"order_ids": "nope"})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("POST", &format!("/api/v1/admin/orders/{}/bank-transfer", first.id), CUSTOMER, Some(json!({})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&h, request("PUT", &uri, ADMIN, Some(json!({"status": "DELIVERED"})))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, order) = send(&h, request("PUT", &uri, ADMIN, Some(json!({"status": "PAID", "notes": "wired early"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["notes"], "wired early");

    let batch = json!({"order_ids": [first.id, uuid::Uuid::new_v4(), second.id], "status": "CANCELLED"});
    let (status, outcome) = send(&h, request("PUT", "/api/v1/admin/orders/status", ADMIN, Some(batch))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["totalUpdated"], 2);
    assert_eq!(outcome["totalFailed"], 1);
}

#[tokio::test]
async fn gateway_callback_redirects_to_result_page() {
    let h = harness();
    let order = h.order("hosted_gateway").await;

    let (status, initiated) = send(&h, request("POST", &format!("/api/v1/orders/{}/payment/gateway", order.id), CUSTOMER,
        Some(json!({"name": "Ada", "surname": "Lovelace", "email": "ada@example.com"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(initiated["redirect_url"], format!("https://pay.test/tok-{}", order.id));

    h.gateway.pay(order.id, "pay-7");
    let callback = || Request::builder()
        .method("POST")
        .uri(format!("/api/v1/payments/callback?order_id={}", order.id))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("token=tok-{}", order.id)))
        .unwrap();

    for _ in 0..2 {
        let response = app(&h).oneshot(callback()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], format!("{BASE_URL}/checkout/success?order_id={}", order.id).as_str());
    }
    assert_eq!(h.gateway.retrieve_count(), 1);

    let bogus = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/payments/callback?order_id={}", uuid::Uuid::new_v4()))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("token=nope"))
        .unwrap();
    let response = app(&h).oneshot(bogus).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers()[header::LOCATION].to_str().unwrap().ends_with("reason=process-error"));
}

#[tokio::test]
async fn bank_transfer_round_trip() {
    let h = harness();
    let order = h.order("bank_transfer").await;

    let (status, instructions) = send(&h, request("POST", &format!("/api/v1/orders/{}/payment/bank-transfer", order.id), CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(instructions["reference_code"].as_str().unwrap().starts_with("BT-"));
    assert_eq!(instructions["account"]["iban"], "GB00TEST00000000000000");

    let uri = format!("/api/v1/admin/orders/{}/bank-transfer", order.id);
    let (status, paid) = send(&h, request("POST", &uri, ADMIN, Some(json!({"decision": "PAID"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "PAID");
}

#[tokio::test]
async fn spreadsheet_import_and_template() {
    let h = harness();

    let response = app(&h).oneshot(request("GET", "/api/v1/admin/import/brands/template", ADMIN, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"brands_template.xlsx\"");
    let template = response.into_body().collect().await.unwrap().to_bytes();

    let boundary = "X-STOREFRONT-BOUNDARY";
    let upload = |filename: &str, bytes: &[u8]| {
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        ).into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/v1/admin/import/brands")
            .header("x-user-id", "admin-1")
            .header("x-user-role", "admin")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    };

    let (status, result) = send(&h, upload("brands.xlsx", &template)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);
    assert_eq!(result["totalProcessed"], 0);

    let (status, body) = send(&h, upload("brands.csv", b"name\nAcme")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["messages"][0].as_str().unwrap().contains("not a spreadsheet"));

    let (status, _) = send(&h, request("GET", "/api/v1/admin/import/users/template", ADMIN, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
