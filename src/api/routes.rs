use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::observability::{get_metrics, HealthChecker, LatencyTimer};
use crate::services::TransactionService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransactionService>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(service: Arc<TransactionService>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            service,
            metrics_handle: None,
            health_checker,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Records request count and latency under the matched route template.
async fn track_http_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Wallet endpoints
        .route("/wallet/deposits", post(handlers::create_deposit))
        .route("/wallet/deposits/:id/complete", post(handlers::complete_deposit))
        .route("/wallet/deposits/:id/cancel", post(handlers::cancel_deposit))
        .route("/wallet/withdrawals", post(handlers::create_withdrawal))
        .route("/wallet/withdrawals/:id/complete", post(handlers::complete_withdrawal))
        .route("/wallet/withdrawals/:id/cancel", post(handlers::cancel_withdrawal))
        // Enrollment endpoints
        .route("/enrollments/fees", post(handlers::create_enrollment_fee))
        .route("/enrollments/fees/:id/complete", post(handlers::complete_enrollment_fee))
        .route("/enrollments/fees/:id/cancel", post(handlers::cancel_enrollment_fee))
        // Query endpoints
        .route("/transactions/:id", get(handlers::get_transaction))
        .route("/users/:user_id/transactions", get(handlers::list_user_transactions))
        .route("/users/:user_id/balance", get(handlers::get_balance))
        .fallback(handlers::not_found)
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
