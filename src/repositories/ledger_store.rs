use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Course, Enrollment, SettlementRecord, Transaction, TransactionType, UserBalance, UserProfile,
};

/// Mutations applied together with the `processing → completed` flip.
#[derive(Debug, Clone, Default)]
pub struct CompletionEffects {
    /// Signed wallet delta. A negative delta is a guarded debit.
    pub balance_delta: Option<i64>,
    pub enrollment: Option<Enrollment>,
}

impl CompletionEffects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_balance_delta(mut self, delta: Option<i64>) -> Self {
        self.balance_delta = delta;
        self
    }

    pub fn with_enrollment(mut self, enrollment: Enrollment) -> Self {
        self.enrollment = Some(enrollment);
        self
    }
}

/// What a successful completion commit wrote.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub transaction: Transaction,
    pub balance: Option<UserBalance>,
    pub enrollment: Option<Enrollment>,
}

/// Persistence for transactions, balances, enrollments and the settlement journal.
///
/// `insert`, `commit_completion` and `commit_cancellation` are conditional
/// writes: the store, not the caller, enforces the one-processing-transaction
/// rule and the `processing` status guard.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Finds the processing transaction for a dedup key.
    /// `course_id` is only consulted for enrollment fees.
    async fn find_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        course_id: Option<Uuid>,
    ) -> Result<Option<Transaction>>;

    /// Inserts a processing transaction.
    ///
    /// Fails with `PendingExists` (carrying the existing row) when another
    /// processing transaction holds the same dedup key, and with `Conflict`
    /// when the reference is already taken.
    async fn insert(&self, transaction: &Transaction) -> Result<Transaction>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// All transactions of a user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>>;

    /// Current balance. A user without a balance row has an empty wallet.
    async fn get_balance(&self, user_id: Uuid) -> Result<UserBalance>;

    async fn find_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>>;

    async fn find_settlement(&self, transaction_id: Uuid) -> Result<Option<SettlementRecord>>;

    /// Upserts a settlement journal entry.
    ///
    /// Progress only accumulates: delivered notifications are merged with the
    /// stored set, and a recorded verification or the settled flag is never
    /// cleared by a stale copy.
    async fn save_settlement(&self, record: &SettlementRecord) -> Result<()>;

    /// Atomically applies `effects`, marks the transaction completed and the
    /// journal entry settled. Nothing is written when any part fails.
    ///
    /// Fails with `Conflict` if the transaction is no longer processing,
    /// `InsufficientBalance` if a debit would overdraw the wallet, and
    /// `CommitFailed` if the balance write itself fails.
    async fn commit_completion(
        &self,
        transaction_id: Uuid,
        effects: CompletionEffects,
    ) -> Result<CompletionOutcome>;

    /// Marks a processing transaction cancelled, or fails with `Conflict`.
    async fn commit_cancellation(&self, transaction_id: Uuid) -> Result<Transaction>;
}

/// Read access to the users and courses owned by the wider back office.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    /// Sets `otp_valid = false` for the user.
    async fn invalidate_otp(&self, user_id: Uuid) -> Result<()>;

    /// Burns the user's OTP only if it equals `code`, is still valid and has
    /// not expired at `now`. Check and write are one atomic step.
    ///
    /// Returns `false` without writing when any condition fails, including
    /// an unknown user.
    async fn consume_otp(&self, user_id: Uuid, code: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>>;
}
