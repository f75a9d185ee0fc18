use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::currency::display_amount;
use crate::models::{
    Enrollment, Gateway, PaymentMethod, Transaction, TransactionStatus, TransactionType, UserBalance,
};
use crate::repositories::CompletionOutcome;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failure that still returns a payload, e.g. the transaction blocking a create.
    pub fn failure(error: ErrorResponse, data: Option<T>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Transaction response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub center_id: Uuid,
    pub course_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
    pub currency: String,
    pub amount: i64,
    /// Amount rendered in major units with the currency symbol.
    pub display_amount: String,
    pub reference: String,
    pub status: TransactionStatus,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            display_amount: display_amount(tx.amount, &tx.currency),
            id: tx.id,
            user_id: tx.user_id,
            center_id: tx.center_id,
            course_id: tx.course_id,
            transaction_type: tx.transaction_type,
            payment_method: tx.payment_method,
            gateway: tx.gateway,
            currency: tx.currency,
            amount: tx.amount,
            reference: tx.reference,
            status: tx.status,
            details: tx.details,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Balance response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<UserBalance> for BalanceResponse {
    fn from(balance: UserBalance) -> Self {
        Self {
            user_id: balance.user_id,
            balance: balance.balance,
            updated_at: balance.updated_at,
        }
    }
}

/// Result of a completed transaction and its committed effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub transaction: TransactionResponse,
    pub balance: Option<BalanceResponse>,
    pub enrollment: Option<Enrollment>,
}

impl From<CompletionOutcome> for CompletionResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        Self {
            transaction: outcome.transaction.into(),
            balance: outcome.balance.map(Into::into),
            enrollment: outcome.enrollment,
        }
    }
}

/// Error returned from handlers, rendered in the standard envelope.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn validation(details: Vec<ValidationErrorDetail>) -> Self {
        Self {
            error: AppError::Validation("Request validation failed".to_string()),
            details: Some(details),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self { error, details: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        // Infrastructure failures are logged in full and reported generically.
        let message = if self.error.is_internal() {
            tracing::error!(code = self.error.code(), error = %self.error, "Request failed");
            "An internal error occurred".to_string()
        } else {
            self.error.to_string()
        };

        let mut body = ErrorResponse::new(self.error.code(), message);
        if let Some(details) = self.details {
            body = body.with_details(details);
        }

        match self.error {
            AppError::PendingExists(existing) => {
                let data = TransactionResponse::from(*existing);
                (status, Json(ApiResponse::failure(body, Some(data)))).into_response()
            }
            _ => (status, Json(ApiResponse::<()>::error(body))).into_response(),
        }
    }
}
