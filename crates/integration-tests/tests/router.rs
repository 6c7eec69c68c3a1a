//! Router-level tests. Every request here is rejected or answered before any
//! query runs, so the lazily-connected pool never opens a connection.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use bazaar_integration_tests::TestContext;
use serde_json::json;

fn assert_error(response: &bazaar_integration_tests::TestResponse, status: StatusCode) {
    assert_eq!(response.status, status, "body: {}", response.body);
    assert_eq!(response.body["success"], false);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::lazy();
    let response = ctx.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn test_every_response_has_request_id() {
    let ctx = TestContext::lazy();
    let response = ctx.get("/health").await;
    assert!(response.request_id.is_some());

    let response = ctx.get("/api/users?sort=password").await;
    assert!(response.request_id.is_some());
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let ctx = TestContext::lazy();
    let response = ctx.get("/api/orders").await;
    assert_error(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_sort_field_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx.get("/api/users?sort=-password").await;
    assert_error(&response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn test_unknown_projection_field_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx.get("/api/posts?fields=title,secret").await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_numbers_rejected() {
    let ctx = TestContext::lazy();
    assert_error(&ctx.get("/api/users?age_gt=old").await, StatusCode::BAD_REQUEST);
    assert_error(&ctx.get("/api/products?minPrice=cheap").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_path_id_rejected() {
    let ctx = TestContext::lazy();
    assert_error(&ctx.get("/api/users/abc").await, StatusCode::BAD_REQUEST);
    assert_error(&ctx.get("/api/tasks/1.5").await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx.post("/api/users", json!({ "name": 42 })).await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_user_rejected_before_insert() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post("/api/users", json!({ "name": "Ada", "email": "not-an-email" }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().starts_with("email"));

    let response = ctx
        .post(
            "/api/users",
            json!({ "name": "Ada", "email": "ada@example.com", "age": 130 }),
        )
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_batches_rejected() {
    let ctx = TestContext::lazy();
    assert_error(&ctx.post("/api/users/bulk", json!([])).await, StatusCode::BAD_REQUEST);
    assert_error(
        &ctx.post("/api/users/transaction", json!([])).await,
        StatusCode::BAD_REQUEST,
    );
    assert_error(
        &ctx.post("/api/cart", json!({ "userId": 1, "items": [] })).await,
        StatusCode::BAD_REQUEST,
    );
}

#[tokio::test]
async fn test_empty_user_patch_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx.patch("/api/users/1", json!({})).await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_increment_step_out_of_range_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post("/api/users/1/increment-age", json!({ "by": 2_147_483_647 }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().starts_with("by"));
}

#[tokio::test]
async fn test_bulk_user_writes_need_a_filter_and_patch() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post("/api/users/bulk-update", json!({ "filter": { "role": "guest" }, "update": {} }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);

    let response = ctx
        .post("/api/users/bulk-update", json!({ "filter": {}, "update": { "age": 3 } }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);

    let response = ctx
        .post("/api/users/bulk-update", json!({ "filter": { "age_gt": "old" }, "update": { "age": 3 } }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);

    let response = ctx
        .post("/api/users/bulk-delete", json!({ "filter": { "includeDeleted": true } }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);

    assert_error(&ctx.post("/api/users/upsert", json!([])).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_zero_quantity_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post(
            "/api/cart",
            json!({ "userId": 1, "items": [{ "productId": 3, "quantity": 0 }] }),
        )
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);

    let response = ctx
        .put("/api/cart/1/item", json!({ "productId": 3, "quantity": 0 }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_negative_quantity_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post(
            "/api/cart",
            json!({ "userId": 1, "items": [{ "productId": 3, "quantity": -2 }] }),
        )
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_task_status_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx
        .patch("/api/tasks/1/status", json!({ "status": "Done" }))
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_post_category_rejected() {
    let ctx = TestContext::lazy();
    let response = ctx
        .post(
            "/api/posts",
            json!({
                "title": "Hello",
                "content": "Body",
                "author": "Ada",
                "category": "Gardening"
            }),
        )
        .await;
    assert_error(&response, StatusCode::BAD_REQUEST);
}
