use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::requests::{
    validation_details, CreateDepositRequest, CreateEnrollmentFeeRequest, CreateWithdrawalRequest,
};
use crate::api::responses::{
    ApiError, ApiResponse, BalanceResponse, CompletionResponse, ErrorResponse, TransactionResponse,
};
use crate::observability::{AggregatedHealth, HealthStatus};

use super::routes::AppState;

type Created<T> = (StatusCode, Json<ApiResponse<T>>);
type HandlerResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn validate<T: Validate>(request: &T) -> Result<(), ApiError> {
    request
        .validate()
        .map_err(|errors| ApiError::validation(validation_details(&errors)))
}

/// Health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = match health.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(ApiResponse::success(health)))
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed".to_string()),
    }
}

// ============================================================================
// Wallet deposits
// ============================================================================

pub async fn create_deposit(
    State(state): State<AppState>,
    Json(request): Json<CreateDepositRequest>,
) -> Result<Created<TransactionResponse>, ApiError> {
    validate(&request)?;
    let transaction = state.service.create_deposit(request.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(transaction.into()))))
}

pub async fn complete_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<CompletionResponse> {
    let outcome = state.service.complete_deposit(id).await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

pub async fn cancel_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<TransactionResponse> {
    let transaction = state.service.cancel_deposit(id).await?;
    Ok(Json(ApiResponse::success(transaction.into())))
}

// ============================================================================
// Wallet withdrawals
// ============================================================================

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<Created<TransactionResponse>, ApiError> {
    validate(&request)?;
    let transaction = state.service.create_withdrawal(request.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(transaction.into()))))
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<CompletionResponse> {
    let outcome = state.service.complete_withdrawal(id).await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<TransactionResponse> {
    let transaction = state.service.cancel_withdrawal(id).await?;
    Ok(Json(ApiResponse::success(transaction.into())))
}

// ============================================================================
// Enrollment fees
// ============================================================================

pub async fn create_enrollment_fee(
    State(state): State<AppState>,
    Json(request): Json<CreateEnrollmentFeeRequest>,
) -> Result<Created<TransactionResponse>, ApiError> {
    validate(&request)?;
    let transaction = state.service.create_enrollment_fee(request.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(transaction.into()))))
}

/// Completes a fee by the gateway reference the client paid with.
pub async fn complete_enrollment_fee(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> HandlerResult<CompletionResponse> {
    let outcome = state.service.complete_enrollment_fee(&reference).await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

pub async fn cancel_enrollment_fee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<TransactionResponse> {
    let transaction = state.service.cancel_enrollment_fee(id).await?;
    Ok(Json(ApiResponse::success(transaction.into())))
}

// ============================================================================
// Queries
// ============================================================================

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<TransactionResponse> {
    let transaction = state.service.get_transaction(id).await?;
    Ok(Json(ApiResponse::success(transaction.into())))
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> HandlerResult<Vec<TransactionResponse>> {
    let transactions = state.service.list_user_transactions(user_id).await?;
    Ok(Json(ApiResponse::success(
        transactions.into_iter().map(TransactionResponse::from).collect(),
    )))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> HandlerResult<BalanceResponse> {
    let balance = state.service.get_balance(user_id).await?;
    Ok(Json(ApiResponse::success(balance.into())))
}

/// Fallback for unknown routes.
pub async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(ErrorResponse::new("NOT_FOUND", "Route not found"))),
    )
}
