use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use wallet_engine::config::{GatewaySettings, NotifierSettings};
use wallet_engine::error::AppError;
use wallet_engine::models::Gateway;
use wallet_engine::services::{Email, GatewayVerifier, HttpGatewayVerifier, HttpNotifier, Notifier};

/// Serves `router` on an ephemeral local port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Clone, Default)]
struct Captured {
    authorization: Arc<Mutex<Option<String>>>,
    reference: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

async fn gateway_stub(response: Value, status: StatusCode) -> (String, Captured) {
    let captured = Captured::default();
    let router = Router::new()
        .route(
            "/verify/:reference",
            get(
                move |State(captured): State<Captured>, Path(reference): Path<String>, headers: HeaderMap| {
                    let response = response.clone();
                    async move {
                        *captured.reference.lock().unwrap() = Some(reference);
                        *captured.authorization.lock().unwrap() = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        (status, Json(response))
                    }
                },
            ),
        )
        .with_state(captured.clone());
    (serve(router).await, captured)
}

fn gateway_settings(base_url: String) -> GatewaySettings {
    GatewaySettings {
        base_url,
        secret_key: "sk_test_123".to_string(),
        timeout_ms: 2_000,
    }
}

#[tokio::test]
async fn test_gateway_a_success() {
    let (url, captured) = gateway_stub(
        json!({"success": true, "data": {"transaction_status": "success", "amount": 5000}}),
        StatusCode::OK,
    )
    .await;
    let verifier = HttpGatewayVerifier::new(Gateway::A, &gateway_settings(url)).unwrap();

    let result = verifier.verify("PSK-001").await.unwrap();
    assert!(result.success);
    assert_eq!(result.amount, 5000);
    assert_eq!(captured.reference.lock().unwrap().as_deref(), Some("PSK-001"));
    assert_eq!(
        captured.authorization.lock().unwrap().as_deref(),
        Some("Bearer sk_test_123")
    );
}

#[tokio::test]
async fn test_gateway_a_abandoned_is_not_success() {
    let (url, _) = gateway_stub(
        json!({"success": true, "data": {"transaction_status": "abandoned", "amount": 5000}}),
        StatusCode::OK,
    )
    .await;
    let verifier = HttpGatewayVerifier::new(Gateway::A, &gateway_settings(url)).unwrap();

    let result = verifier.verify("PSK-002").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status, "abandoned");
}

#[tokio::test]
async fn test_gateway_b_requires_both_statuses() {
    let (url, _) = gateway_stub(
        json!({"status": "success", "data": {"status": "successful", "amount": 7500}}),
        StatusCode::OK,
    )
    .await;
    let verifier = HttpGatewayVerifier::new(Gateway::B, &gateway_settings(url)).unwrap();
    let result = verifier.verify("FLW-1").await.unwrap();
    assert!(result.success);
    assert_eq!(result.amount, 7500);

    let (url, _) = gateway_stub(
        json!({"status": "success", "data": {"status": "pending", "amount": 7500}}),
        StatusCode::OK,
    )
    .await;
    let verifier = HttpGatewayVerifier::new(Gateway::B, &gateway_settings(url)).unwrap();
    assert!(!verifier.verify("FLW-2").await.unwrap().success);
}

#[tokio::test]
async fn test_gateway_error_status_is_verification_failure() {
    let (url, _) = gateway_stub(json!({"message": "Transaction reference not found"}), StatusCode::NOT_FOUND).await;
    let verifier = HttpGatewayVerifier::new(Gateway::A, &gateway_settings(url)).unwrap();

    let err = verifier.verify("PSK-404").await.unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed(_)));
    assert!(err.to_string().contains("Transaction reference not found"));
}

#[tokio::test]
async fn test_gateway_unreachable() {
    let verifier = HttpGatewayVerifier::new(Gateway::A, &gateway_settings("http://127.0.0.1:1".to_string())).unwrap();
    assert!(matches!(
        verifier.verify("PSK-003").await,
        Err(AppError::VerificationFailed(_))
    ));
}

async fn mailer_stub(response: Value) -> (String, Captured) {
    let captured = Captured::default();
    let router = Router::new()
        .route(
            "/send",
            post(
                move |State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| {
                    let response = response.clone();
                    async move {
                        *captured.body.lock().unwrap() = Some(body);
                        *captured.authorization.lock().unwrap() = headers
                            .get("x-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        Json(response)
                    }
                },
            ),
        )
        .with_state(captured.clone());
    (serve(router).await, captured)
}

fn notifier_settings(base_url: String) -> NotifierSettings {
    NotifierSettings {
        base_url,
        api_key: "mail-key".to_string(),
        sender: "noreply@example.com".to_string(),
        timeout_ms: 2_000,
    }
}

fn email() -> Email {
    Email {
        from: "noreply@example.com".to_string(),
        to: "learner@example.com".to_string(),
        subject: "Deposit successful".to_string(),
        text: "Your wallet has been credited.".to_string(),
        html: "<p>Your wallet has been credited.</p>".to_string(),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn test_notifier_delivers() {
    let (url, captured) = mailer_stub(json!({"success": true, "data": {"id": "msg_42"}})).await;
    let notifier = HttpNotifier::new(&notifier_settings(url)).unwrap();

    notifier.send(&email()).await.unwrap();

    assert_eq!(captured.authorization.lock().unwrap().as_deref(), Some("mail-key"));
    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["to"], "learner@example.com");
    assert_eq!(body["subject"], "Deposit successful");
    assert!(body.get("attachments").is_none());
}

#[tokio::test]
async fn test_notifier_null_data_is_failure() {
    let (url, _) = mailer_stub(json!({"success": true, "data": null})).await;
    let notifier = HttpNotifier::new(&notifier_settings(url)).unwrap();

    assert!(matches!(
        notifier.send(&email()).await,
        Err(AppError::NotificationFailed(_))
    ));
}

#[tokio::test]
async fn test_notifier_rejection_is_failure() {
    let (url, _) = mailer_stub(json!({"success": false, "data": null, "message": "invalid recipient"})).await;
    let notifier = HttpNotifier::new(&notifier_settings(url)).unwrap();

    let err = notifier.send(&email()).await.unwrap_err();
    assert!(err.to_string().contains("invalid recipient"));
}
