use http::StatusCode;
use thiserror::Error;

use crate::models::Transaction;

/// Errors surfaced by the wallet engine.
///
/// Every variant aborts only the operation in flight. `Display` is the
/// human-readable reason; `code()` is the stable machine-readable kind.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A {} transaction is already processing (reference {})", .0.transaction_type, .0.reference)]
    PendingExists(Box<Transaction>),

    #[error("User is already enrolled in this course")]
    AlreadyEnrolled,

    #[error("Card payments must include the gateway reference")]
    MissingReference,

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("The OTP provided does not match")]
    InvalidOtp,

    #[error("The OTP has already been used")]
    OtpInvalidated,

    #[error("The OTP has expired, request a new one")]
    OtpExpired,

    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("Verified amount {verified} is less than the transaction amount {expected}")]
    AmountMismatch { expected: i64, verified: i64 },

    #[error("Notification could not be delivered: {0}")]
    NotificationFailed(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("No processing transaction: {0}")]
    NotPending(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable error code for API responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PendingExists(_) => "PENDING_EXISTS",
            AppError::AlreadyEnrolled => "ALREADY_ENROLLED",
            AppError::MissingReference => "MISSING_REFERENCE",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::InvalidOtp => "INVALID_OTP",
            AppError::OtpInvalidated => "OTP_INVALIDATED",
            AppError::OtpExpired => "OTP_EXPIRED",
            AppError::VerificationFailed(_) => "VERIFICATION_FAILED",
            AppError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            AppError::NotificationFailed(_) => "NOTIFICATION_FAILED",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::NotPending(_) => "NOT_PENDING",
            AppError::CommitFailed(_) => "COMMIT_FAILED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingReference => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::NotPending(_) => StatusCode::NOT_FOUND,
            AppError::PendingExists(_)
            | AppError::AlreadyEnrolled
            | AppError::InvalidState(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientBalance { .. } | AppError::AmountMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidOtp | AppError::OtpInvalidated | AppError::OtpExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::VerificationFailed(_) | AppError::NotificationFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::CommitFailed(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures caused by our own infrastructure rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) | AppError::CommitFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
