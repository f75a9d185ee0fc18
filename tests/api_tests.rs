mod common;

use common::{TestHarness, OTP};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use wallet_engine::api::responses::{ApiResponse, ErrorResponse};
use wallet_engine::api::{create_router, AppState};
use wallet_engine::observability::HealthChecker;
use wallet_engine::services::VerificationResult;

async fn spawn_app(h: &TestHarness) -> String {
    let state = AppState::new(h.service.clone(), Arc::new(HealthChecker::new(None)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_api_response_success_serialization() {
    let response: ApiResponse<String> = ApiResponse::success("test data".to_string());
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"data\":\"test data\""));
}

#[tokio::test]
async fn test_api_response_error_serialization() {
    let error = ErrorResponse::new("TEST_ERROR", "Test error message");
    let response: ApiResponse<()> = ApiResponse::<()>::error(error);
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"code\":\"TEST_ERROR\""));
}

#[tokio::test]
async fn test_deposit_lifecycle_over_http() {
    let h = TestHarness::new().await;
    let base = spawn_app(&h).await;
    let client = reqwest::Client::new();

    let body = json!({
        "user_id": h.user.id,
        "center_id": Uuid::new_v4(),
        "amount": 2500,
        "currency": "NGN",
        "payment_method": "wallet"
    });

    let response = client.post(format!("{}/wallet/deposits", base)).json(&body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["type"], "deposit");
    assert_eq!(created["data"]["status"], "processing");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    // Second create returns the blocking transaction.
    let response = client.post(format!("{}/wallet/deposits", base)).json(&body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let conflict: Value = response.json().await.unwrap();
    assert_eq!(conflict["success"], false);
    assert_eq!(conflict["error"]["code"], "PENDING_EXISTS");
    assert_eq!(conflict["data"]["id"], id.as_str());

    let response = client
        .post(format!("{}/wallet/deposits/{}/complete", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let completed: Value = response.json().await.unwrap();
    assert_eq!(completed["data"]["transaction"]["status"], "completed");
    assert_eq!(completed["data"]["balance"]["balance"], 2500);

    let balance: Value = client
        .get(format!("{}/users/{}/balance", base, h.user.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balance["data"]["balance"], 2500);

    let listed: Value = client
        .get(format!("{}/users/{}/transactions", base, h.user.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_validation_errors_carry_details() {
    let h = TestHarness::new().await;
    let base = spawn_app(&h).await;

    let response = reqwest::Client::new()
        .post(format!("{}/wallet/withdrawals", base))
        .json(&json!({
            "user_id": h.user.id,
            "center_id": Uuid::new_v4(),
            "amount": -5,
            "currency": "NGN",
            "otp": OTP
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "amount");
}

#[tokio::test]
async fn test_withdrawal_errors_map_to_status() {
    let h = TestHarness::new().await;
    h.store.set_balance(h.user.id, 100).await;
    let base = spawn_app(&h).await;
    let client = reqwest::Client::new();

    let request = |otp: &str| {
        json!({
            "user_id": h.user.id,
            "center_id": Uuid::new_v4(),
            "amount": 200,
            "currency": "NGN",
            "otp": otp
        })
    };

    let response = client.post(format!("{}/wallet/withdrawals", base)).json(&request("999999")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_OTP");

    let response = client.post(format!("{}/wallet/withdrawals", base)).json(&request(OTP)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn test_enrollment_fee_over_http() {
    let h = TestHarness::new().await;
    let course = h.add_course("Data Engineering", 40_000).await;
    h.gateway_b.set(VerificationResult::successful(40_000));
    let base = spawn_app(&h).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/enrollments/fees", base))
        .json(&json!({
            "user_id": h.user.id,
            "course_id": course.id,
            "payment_method": "card",
            "gateway": "B"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["data"]["amount"], 40_000);
    let reference = created["data"]["reference"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/enrollments/fees/{}/complete", base, reference))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let completed: Value = response.json().await.unwrap();
    assert_eq!(completed["data"]["enrollment"]["course_id"], course.id.to_string());
    assert!(completed["data"]["balance"].is_null());
}

#[tokio::test]
async fn test_unknown_transaction_and_route() {
    let h = TestHarness::new().await;
    let base = spawn_app(&h).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/transactions/{}", base, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(format!("{}/wallet/deposits/{}/cancel", base, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_PENDING");

    let response = client.get(format!("{}/nowhere", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = TestHarness::new().await;
    let base = spawn_app(&h).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "healthy");

    let response = client.get(format!("{}/live", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // No recorder installed in this process.
    let response = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
