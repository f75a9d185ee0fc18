use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transactional emails sent around the transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DepositReceipt,
    WithdrawalReceipt,
    FeeReceipt,
    EnrollmentWelcome,
    Cancellation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DepositReceipt => "deposit_receipt",
            NotificationKind::WithdrawalReceipt => "withdrawal_receipt",
            NotificationKind::FeeReceipt => "fee_receipt",
            NotificationKind::EnrollmentWelcome => "enrollment_welcome",
            NotificationKind::Cancellation => "cancellation",
        }
    }
}

/// Settlement journal entry for a transaction on its way to `completed`.
///
/// Records the gateway verification outcome and which notifications were
/// delivered, so a completion retried after a notifier failure neither
/// re-verifies the charge nor re-sends delivered emails. The commit marks the
/// entry settled in the same unit that flips the transaction status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettlementRecord {
    pub transaction_id: Uuid,
    pub verified_amount: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub gateway_status: Option<String>,
    pub notifications_sent: Vec<String>,
    pub settled: bool,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn new(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            verified_amount: None,
            verified_at: None,
            gateway_status: None,
            notifications_sent: Vec::new(),
            settled: false,
            updated_at: Utc::now(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }

    pub fn record_verification(&mut self, amount: i64, status: impl Into<String>) {
        self.verified_amount = Some(amount);
        self.gateway_status = Some(status.into());
        self.verified_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn has_sent(&self, kind: NotificationKind) -> bool {
        self.notifications_sent.iter().any(|k| k == kind.as_str())
    }

    pub fn mark_sent(&mut self, kind: NotificationKind) {
        if !self.has_sent(kind) {
            self.notifications_sent.push(kind.as_str().to_string());
            self.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_sent_is_idempotent() {
        let mut record = SettlementRecord::new(Uuid::new_v4());
        assert!(!record.has_sent(NotificationKind::FeeReceipt));

        record.mark_sent(NotificationKind::FeeReceipt);
        record.mark_sent(NotificationKind::FeeReceipt);

        assert!(record.has_sent(NotificationKind::FeeReceipt));
        assert!(!record.has_sent(NotificationKind::EnrollmentWelcome));
        assert_eq!(record.notifications_sent.len(), 1);
    }

    #[test]
    fn test_record_verification() {
        let mut record = SettlementRecord::new(Uuid::new_v4());
        assert!(!record.is_verified());
        record.record_verification(5000, "success");
        assert!(record.is_verified());
        assert_eq!(record.verified_amount, Some(5000));
    }
}
