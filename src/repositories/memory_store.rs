use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ledger_store::{CompletionEffects, CompletionOutcome, DirectoryStore, LedgerStore};
use crate::error::{AppError, Result};
use crate::models::{
    Course, Enrollment, PendingKey, SettlementRecord, Transaction, TransactionStatus,
    TransactionType, UserBalance, UserProfile,
};

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, Transaction>,
    by_reference: HashMap<String, Uuid>,
    /// Unique index over processing transactions.
    pending: HashMap<PendingKey, Uuid>,
    balances: HashMap<Uuid, UserBalance>,
    enrollments: Vec<Enrollment>,
    settlements: HashMap<Uuid, SettlementRecord>,
    users: HashMap<Uuid, UserProfile>,
    courses: HashMap<Uuid, Course>,
}

impl State {
    fn pending_for(&self, key: PendingKey) -> Option<&Transaction> {
        self.pending.get(&key).and_then(|id| self.transactions.get(id))
    }

    fn balance_of(&self, user_id: Uuid) -> UserBalance {
        self.balances
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserBalance::empty(user_id))
    }
}

/// Store backed by process memory.
///
/// Every operation runs under one lock, which makes the conditional insert and
/// the commits atomic. Used by tests and for running the service without
/// PostgreSQL.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: UserProfile) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn put_course(&self, course: Course) {
        self.state.write().await.courses.insert(course.id, course);
    }

    /// Overwrites a user's balance.
    pub async fn set_balance(&self, user_id: Uuid, balance: i64) {
        self.state
            .write()
            .await
            .balances
            .insert(user_id, UserBalance::with_balance(user_id, balance));
    }

    pub async fn enrollments_for(&self, user_id: Uuid) -> Vec<Enrollment> {
        self.state
            .read()
            .await
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn find_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        course_id: Option<Uuid>,
    ) -> Result<Option<Transaction>> {
        let key = match (transaction_type, course_id) {
            (TransactionType::EnrollmentFee, Some(course_id)) => PendingKey::Course(user_id, course_id),
            (TransactionType::EnrollmentFee, None) => return Ok(None),
            (other, _) => PendingKey::Wallet(user_id, other),
        };
        Ok(self.state.read().await.pending_for(key).cloned())
    }

    async fn insert(&self, transaction: &Transaction) -> Result<Transaction> {
        let mut state = self.state.write().await;

        let key = transaction.pending_key();
        if let Some(existing) = key.and_then(|k| state.pending_for(k)) {
            return Err(AppError::PendingExists(Box::new(existing.clone())));
        }
        if state.by_reference.contains_key(&transaction.reference) {
            return Err(AppError::Conflict(format!(
                "reference '{}' is already in use",
                transaction.reference
            )));
        }

        if let Some(key) = key {
            state.pending.insert(key, transaction.id);
        }
        state
            .by_reference
            .insert(transaction.reference.clone(), transaction.id);
        state.transactions.insert(transaction.id, transaction.clone());

        Ok(transaction.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .by_reference
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_balance(&self, user_id: Uuid) -> Result<UserBalance> {
        Ok(self.state.read().await.balance_of(user_id))
    }

    async fn find_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn find_settlement(&self, transaction_id: Uuid) -> Result<Option<SettlementRecord>> {
        Ok(self.state.read().await.settlements.get(&transaction_id).cloned())
    }

    async fn save_settlement(&self, record: &SettlementRecord) -> Result<()> {
        let mut state = self.state.write().await;

        let mut record = record.clone();
        if let Some(existing) = state.settlements.get(&record.transaction_id) {
            record.settled |= existing.settled;
            for kind in &existing.notifications_sent {
                if !record.notifications_sent.contains(kind) {
                    record.notifications_sent.push(kind.clone());
                }
            }
            if !record.is_verified() && existing.is_verified() {
                record.verified_amount = existing.verified_amount;
                record.verified_at = existing.verified_at;
                record.gateway_status = existing.gateway_status.clone();
            }
        }
        state.settlements.insert(record.transaction_id, record);
        Ok(())
    }

    async fn commit_completion(
        &self,
        transaction_id: Uuid,
        effects: CompletionEffects,
    ) -> Result<CompletionOutcome> {
        let mut state = self.state.write().await;

        let current = state
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", transaction_id)))?;
        if current.status != TransactionStatus::Processing {
            return Err(AppError::Conflict(format!(
                "transaction '{}' is already {:?}",
                transaction_id, current.status
            )));
        }

        // Compute every write before touching state so a failure leaves nothing behind.
        let balance = match effects.balance_delta {
            Some(delta) => {
                let before = state.balance_of(current.user_id);
                if before.balance.checked_add(delta).is_none() {
                    return Err(AppError::CommitFailed("balance update overflowed".to_string()));
                }
                let after = before.apply_delta(delta).ok_or(AppError::InsufficientBalance {
                    requested: -delta,
                    available: before.balance,
                })?;
                Some(after)
            }
            None => None,
        };

        let mut completed = current;
        completed.transition(TransactionStatus::Completed)?;

        if let Some(balance) = &balance {
            state.balances.insert(balance.user_id, balance.clone());
        }
        if let Some(enrollment) = &effects.enrollment {
            state.enrollments.push(enrollment.clone());
        }
        let settlement = state
            .settlements
            .entry(transaction_id)
            .or_insert_with(|| SettlementRecord::new(transaction_id));
        settlement.settled = true;
        settlement.updated_at = Utc::now();
        if let Some(key) = completed.pending_key() {
            state.pending.remove(&key);
        }
        state.transactions.insert(transaction_id, completed.clone());

        Ok(CompletionOutcome {
            transaction: completed,
            balance,
            enrollment: effects.enrollment,
        })
    }

    async fn commit_cancellation(&self, transaction_id: Uuid) -> Result<Transaction> {
        let mut state = self.state.write().await;

        let mut transaction = state
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", transaction_id)))?;
        if transaction.status != TransactionStatus::Processing {
            return Err(AppError::Conflict(format!(
                "transaction '{}' is already {:?}",
                transaction_id, transaction.status
            )));
        }

        transaction.transition(TransactionStatus::Cancelled)?;
        if let Some(key) = transaction.pending_key() {
            state.pending.remove(&key);
        }
        state.transactions.insert(transaction_id, transaction.clone());

        Ok(transaction)
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn invalidate_otp(&self, user_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))?;
        user.otp_valid = false;
        Ok(())
    }

    async fn consume_otp(&self, user_id: Uuid, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };

        let redeemable = user.otp_code.as_deref() == Some(code)
            && user.otp_valid
            && user.otp_expiration.map_or(false, |expires_at| expires_at >= now);
        if redeemable {
            user.otp_valid = false;
        }
        Ok(redeemable)
    }

    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>> {
        Ok(self.state.read().await.courses.get(&course_id).cloned())
    }
}
