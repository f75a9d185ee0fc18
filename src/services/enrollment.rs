use crate::error::{AppError, Result};
use crate::models::{Enrollment, NotificationKind, Transaction, TransactionType};
use crate::repositories::{CompletionEffects, LedgerStore};
use uuid::Uuid;

/// Second committed effect of an enrollment-fee completion.
pub struct EnrollmentHandler;

impl EnrollmentHandler {
    /// Notifications that must all be delivered before the fee commits.
    pub const COMPLETION_NOTIFICATIONS: [NotificationKind; 2] =
        [NotificationKind::FeeReceipt, NotificationKind::EnrollmentWelcome];

    /// Completion effects for a fee: the enrollment row, no wallet delta.
    pub fn completion_effects(transaction: &Transaction) -> Result<CompletionEffects> {
        if transaction.transaction_type != TransactionType::EnrollmentFee {
            return Err(AppError::InvalidState(format!(
                "{} transaction cannot create an enrollment",
                transaction.transaction_type
            )));
        }
        let course_id = transaction.course_id.ok_or_else(|| {
            AppError::InvalidState(format!("enrollment fee '{}' has no course", transaction.id))
        })?;

        let enrollment = Enrollment::new(transaction.user_id, course_id, transaction.reference.clone());
        Ok(CompletionEffects::none().with_enrollment(enrollment))
    }

    /// Rejects a second purchase of a seat the user already holds.
    pub async fn ensure_not_enrolled(ledger: &dyn LedgerStore, user_id: Uuid, course_id: Uuid) -> Result<()> {
        match ledger.find_enrollment(user_id, course_id).await? {
            Some(_) => Err(AppError::AlreadyEnrolled),
            None => Ok(()),
        }
    }
}
