use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Kind of wallet operation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money entering the user's wallet.
    Deposit,
    /// Money leaving the user's wallet.
    Withdrawal,
    /// Course fee paid to a center. Never touches the wallet balance.
    EnrollmentFee,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::EnrollmentFee => "enrollment_fee",
        }
    }

    /// Signed wallet delta applied when a transaction of this type completes.
    pub fn balance_delta(&self, amount: i64) -> Option<i64> {
        match self {
            TransactionType::Deposit => Some(amount),
            TransactionType::Withdrawal => Some(-amount),
            TransactionType::EnrollmentFee => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Wallet,
}

/// External card gateway that charged the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_gateway")]
pub enum Gateway {
    A,
    B,
}

impl Gateway {
    /// Gateway B reports the charged amount and must cover the transaction amount.
    pub fn requires_amount_check(&self) -> bool {
        matches!(self, Gateway::B)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::A => "A",
            Gateway::B => "B",
        }
    }
}

/// Status of a transaction in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Recorded but not yet confirmed or cancelled.
    Processing,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    /// Returns true if the transaction is in a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled
        )
    }

    /// Checks if a transition is valid.
    pub fn can_transition_to(&self, to: TransactionStatus) -> bool {
        matches!(
            (self, to),
            (
                TransactionStatus::Processing,
                TransactionStatus::Completed | TransactionStatus::Cancelled
            )
        )
    }

    /// Validates a transition, failing with `InvalidState` when it is not allowed.
    pub fn transition(self, to: TransactionStatus) -> Result<TransactionStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(AppError::InvalidState(format!(
                "cannot move a {:?} transaction to {:?}",
                self, to
            )))
        }
    }
}

/// Key under which at most one `processing` transaction may exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Wallet(Uuid, TransactionType),
    Course(Uuid, Uuid),
}

/// A wallet or enrollment-fee transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub center_id: Uuid,
    pub course_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
    pub currency: String,
    /// Amount in minor units.
    pub amount: i64,
    pub reference: String,
    pub status: TransactionStatus,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new `processing` transaction.
    pub fn new(
        user_id: Uuid,
        center_id: Uuid,
        transaction_type: TransactionType,
        payment_method: PaymentMethod,
        gateway: Option<Gateway>,
        currency: String,
        amount: i64,
        reference: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            center_id,
            course_id: None,
            transaction_type,
            payment_method,
            gateway,
            currency,
            amount,
            reference,
            status: TransactionStatus::Processing,
            details: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_course(mut self, course_id: Uuid) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn is_processing(&self) -> bool {
        self.status == TransactionStatus::Processing
    }

    /// The dedup key, or `None` for an enrollment fee without a course.
    pub fn pending_key(&self) -> Option<PendingKey> {
        match self.transaction_type {
            TransactionType::EnrollmentFee => self
                .course_id
                .map(|course_id| PendingKey::Course(self.user_id, course_id)),
            other => Some(PendingKey::Wallet(self.user_id, other)),
        }
    }

    /// Applies a status transition in place.
    pub fn transition(&mut self, to: TransactionStatus) -> Result<()> {
        self.status = self.status.transition(to)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Generates a wallet reference for transactions not charged on a card.
pub fn generate_reference(transaction_type: TransactionType) -> String {
    let prefix = match transaction_type {
        TransactionType::Deposit => "DEP",
        TransactionType::Withdrawal => "WDR",
        TransactionType::EnrollmentFee => "ENR",
    };
    format!("{}-{}", prefix, Uuid::new_v4().simple().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TransactionType::Deposit,
            PaymentMethod::Wallet,
            None,
            "NGN".to_string(),
            500,
            generate_reference(TransactionType::Deposit),
        )
    }

    #[test]
    fn test_status_transitions() {
        assert!(TransactionStatus::Processing.can_transition_to(TransactionStatus::Completed));
        assert!(TransactionStatus::Processing.can_transition_to(TransactionStatus::Cancelled));
        assert!(!TransactionStatus::Completed.can_transition_to(TransactionStatus::Cancelled));
        assert!(!TransactionStatus::Cancelled.can_transition_to(TransactionStatus::Completed));
        assert!(!TransactionStatus::Processing.can_transition_to(TransactionStatus::Processing));
    }

    #[test]
    fn test_terminal_transition_is_invalid_state() {
        let mut tx = deposit();
        tx.transition(TransactionStatus::Completed).unwrap();
        let err = tx.transition(TransactionStatus::Cancelled).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_balance_delta() {
        assert_eq!(TransactionType::Deposit.balance_delta(500), Some(500));
        assert_eq!(TransactionType::Withdrawal.balance_delta(500), Some(-500));
        assert_eq!(TransactionType::EnrollmentFee.balance_delta(500), None);
    }

    #[test]
    fn test_pending_key() {
        let tx = deposit();
        assert_eq!(
            tx.pending_key(),
            Some(PendingKey::Wallet(tx.user_id, TransactionType::Deposit))
        );

        let course_id = Uuid::new_v4();
        let mut fee = deposit().with_course(course_id);
        fee.transaction_type = TransactionType::EnrollmentFee;
        assert_eq!(fee.pending_key(), Some(PendingKey::Course(fee.user_id, course_id)));
    }

    #[test]
    fn test_generated_references_are_unique() {
        let a = generate_reference(TransactionType::Withdrawal);
        let b = generate_reference(TransactionType::Withdrawal);
        assert!(a.starts_with("WDR-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let tx = deposit();
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "deposit");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["payment_method"], "wallet");
    }
}
