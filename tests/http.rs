//! Router-level tests. None of these reach the database.

mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use consignment_backend::app;

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = app(common::offline_state())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_uses_the_envelope() {
    let (status, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({ "status": "ok" }));
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    for uri in [
        "/api/orders/getOrders",
        "/api/products/getAllProducts",
        "/api/carts/getCartId/1",
        "/api/payments/getPaymentsByMonth",
        "/api/users/checkLogin",
    ] {
        let (status, body) = send(get(uri)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing Auth Token");
    }
}

#[tokio::test]
async fn malformed_tokens_are_rejected_before_any_lookup() {
    let request = Request::builder()
        .uri("/api/orders/getOrders")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Invalid token format");
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let (status, body) = send(post_json("/api/users/register", "{ not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn registration_is_validated_before_touching_the_store() {
    let payload = json!({
        "name": "Ana",
        "email": "ana@example.com",
        "password": "abc",
        "confirm_password": "abc",
        "phone": "0712345678",
        "right_code": 1,
    });
    let (status, body) = send(post_json("/api/users/register", &payload.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Password must have at least 6 characters");
}

#[tokio::test]
async fn login_requires_both_credentials() {
    let (status, body) = send(post_json(
        "/api/users/login",
        &json!({ "email": "ana@example.com" }).to_string(),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email and password are required");
}

#[tokio::test]
async fn openapi_document_lists_the_workflow_routes() {
    let (status, body) = send(get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);

    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/api/orders/createOrder",
        "/api/payments/createPayment",
        "/api/carts/addCartProduct/{cart_id}",
        "/api/products/increaseProductPrice/{product_id}",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
    assert!(body["components"]["securitySchemes"]["bearerAuth"].is_object());
}
