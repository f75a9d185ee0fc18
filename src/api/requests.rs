use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::api::responses::ValidationErrorDetail;
use crate::models::{Gateway, PaymentMethod};
use crate::services::{DepositRequest, EnrollmentFeeRequest, WithdrawalRequest};

/// Request to open a wallet deposit.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateDepositRequest {
    pub user_id: Uuid,
    pub center_id: Uuid,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,
    #[validate(length(equal = 3, message = "currency must be a 3-letter ISO 4217 code"))]
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
    #[validate(length(min = 1, max = 128, message = "reference must be 1-128 characters"))]
    pub reference: Option<String>,
}

impl From<CreateDepositRequest> for DepositRequest {
    fn from(request: CreateDepositRequest) -> Self {
        Self {
            user_id: request.user_id,
            center_id: request.center_id,
            amount: request.amount,
            currency: request.currency,
            payment_method: request.payment_method,
            gateway: request.gateway,
            reference: request.reference,
        }
    }
}

/// Request to open a wallet withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWithdrawalRequest {
    pub user_id: Uuid,
    pub center_id: Uuid,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,
    #[validate(length(equal = 3, message = "currency must be a 3-letter ISO 4217 code"))]
    pub currency: String,
    #[validate(length(min = 4, max = 10, message = "otp must be 4-10 characters"))]
    pub otp: String,
}

impl From<CreateWithdrawalRequest> for WithdrawalRequest {
    fn from(request: CreateWithdrawalRequest) -> Self {
        Self {
            user_id: request.user_id,
            center_id: request.center_id,
            amount: request.amount,
            currency: request.currency,
            otp: request.otp,
        }
    }
}

/// Request to pay a course fee. Price and currency are taken from the course.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEnrollmentFeeRequest {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
}

impl From<CreateEnrollmentFeeRequest> for EnrollmentFeeRequest {
    fn from(request: CreateEnrollmentFeeRequest) -> Self {
        Self {
            user_id: request.user_id,
            course_id: request.course_id,
            payment_method: request.payment_method,
            gateway: request.gateway,
        }
    }
}

/// Flattens `validator` output into per-field details, sorted by field name.
pub fn validation_details(errors: &ValidationErrors) -> Vec<ValidationErrorDetail> {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| ValidationErrorDetail {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}
