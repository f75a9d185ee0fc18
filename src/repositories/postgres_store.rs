use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ledger_store::{CompletionEffects, CompletionOutcome, DirectoryStore, LedgerStore};
use crate::error::{AppError, Result};
use crate::models::{
    Course, Enrollment, SettlementRecord, Transaction, TransactionType, UserBalance, UserProfile,
};

/// PostgreSQL-backed store.
///
/// The dedup rule lives in two partial unique indexes on
/// `wallet_transactions`, so concurrent inserts race inside the database and
/// the loser sees `ON CONFLICT DO NOTHING` return no row.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts unless a unique index rejects the row, in which case `None`.
    async fn insert_row(&self, transaction: &Transaction) -> Result<Option<Transaction>> {
        let inserted = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO wallet_transactions (id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT DO NOTHING
            RETURNING id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.center_id)
        .bind(transaction.course_id)
        .bind(transaction.transaction_type)
        .bind(transaction.payment_method)
        .bind(transaction.gateway)
        .bind(&transaction.currency)
        .bind(transaction.amount)
        .bind(&transaction.reference)
        .bind(transaction.status)
        .bind(&transaction.details)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(inserted)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn find_pending(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        course_id: Option<Uuid>,
    ) -> Result<Option<Transaction>> {
        if transaction_type == TransactionType::EnrollmentFee && course_id.is_none() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            FROM wallet_transactions
            WHERE user_id = $1 AND type = $2 AND status = 'processing'
              AND ($2 <> 'enrollment_fee' OR course_id = $3)
            "#,
        )
        .bind(user_id)
        .bind(transaction_type)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn insert(&self, transaction: &Transaction) -> Result<Transaction> {
        // A second attempt covers the processing row that blocked the first one
        // settling before the lookup below could see it.
        for _ in 0..2 {
            if let Some(row) = self.insert_row(transaction).await? {
                return Ok(row);
            }

            let existing = self
                .find_pending(
                    transaction.user_id,
                    transaction.transaction_type,
                    transaction.course_id,
                )
                .await?;
            if let Some(existing) = existing {
                return Err(AppError::PendingExists(Box::new(existing)));
            }

            if self.find_by_reference(&transaction.reference).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "reference '{}' is already in use",
                    transaction.reference
                )));
            }
        }

        Err(AppError::Conflict(format!(
            "transaction '{}' lost repeated dedup races",
            transaction.id
        )))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            FROM wallet_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            FROM wallet_transactions
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn get_balance(&self, user_id: Uuid) -> Result<UserBalance> {
        let row = sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT user_id, balance, updated_at
            FROM user_balances
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.unwrap_or_else(|| UserBalance::empty(user_id)))
    }

    async fn find_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT id, user_id, course_id, reference, status, enrolled_date
            FROM enrollments
            WHERE user_id = $1 AND course_id = $2
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_settlement(&self, transaction_id: Uuid) -> Result<Option<SettlementRecord>> {
        let row = sqlx::query_as::<_, SettlementRecord>(
            r#"
            SELECT transaction_id, verified_amount, verified_at, gateway_status, notifications_sent, settled, updated_at
            FROM settlement_journal
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn save_settlement(&self, record: &SettlementRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settlement_journal (transaction_id, verified_amount, verified_at, gateway_status, notifications_sent, settled, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO UPDATE
            SET verified_amount = COALESCE(EXCLUDED.verified_amount, settlement_journal.verified_amount),
                verified_at = COALESCE(EXCLUDED.verified_at, settlement_journal.verified_at),
                gateway_status = COALESCE(EXCLUDED.gateway_status, settlement_journal.gateway_status),
                notifications_sent = ARRAY(
                    SELECT DISTINCT kind
                    FROM unnest(settlement_journal.notifications_sent || EXCLUDED.notifications_sent) AS kind
                ),
                settled = settlement_journal.settled OR EXCLUDED.settled,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.transaction_id)
        .bind(record.verified_amount)
        .bind(record.verified_at)
        .bind(&record.gateway_status)
        .bind(&record.notifications_sent)
        .bind(record.settled)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn commit_completion(
        &self,
        transaction_id: Uuid,
        effects: CompletionEffects,
    ) -> Result<CompletionOutcome> {
        // Dropping `tx` on any early return rolls every statement back.
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE wallet_transactions
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| {
            AppError::Conflict(format!("transaction '{}' is no longer processing", transaction_id))
        })?;

        let balance = match effects.balance_delta {
            Some(delta) if delta >= 0 => Some(
                sqlx::query_as::<_, UserBalance>(
                    r#"
                    INSERT INTO user_balances (user_id, balance, updated_at)
                    VALUES ($1, $2, NOW())
                    ON CONFLICT (user_id) DO UPDATE
                    SET balance = user_balances.balance + EXCLUDED.balance,
                        updated_at = NOW()
                    RETURNING user_id, balance, updated_at
                    "#,
                )
                .bind(transaction.user_id)
                .bind(delta)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AppError::CommitFailed(format!("balance credit failed: {}", e)))?,
            ),
            Some(delta) => {
                let debited = sqlx::query_as::<_, UserBalance>(
                    r#"
                    UPDATE user_balances
                    SET balance = balance + $2, updated_at = NOW()
                    WHERE user_id = $1 AND balance + $2 >= 0
                    RETURNING user_id, balance, updated_at
                    "#,
                )
                .bind(transaction.user_id)
                .bind(delta)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AppError::CommitFailed(format!("balance debit failed: {}", e)))?;

                match debited {
                    Some(balance) => Some(balance),
                    None => {
                        let available: Option<i64> = sqlx::query_scalar(
                            "SELECT balance FROM user_balances WHERE user_id = $1",
                        )
                        .bind(transaction.user_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(AppError::Database)?;

                        return Err(AppError::InsufficientBalance {
                            requested: -delta,
                            available: available.unwrap_or(0),
                        });
                    }
                }
            }
            None => None,
        };

        let enrollment = match effects.enrollment {
            Some(enrollment) => Some(
                sqlx::query_as::<_, Enrollment>(
                    r#"
                    INSERT INTO enrollments (id, user_id, course_id, reference, status, enrolled_date)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id, user_id, course_id, reference, status, enrolled_date
                    "#,
                )
                .bind(enrollment.id)
                .bind(enrollment.user_id)
                .bind(enrollment.course_id)
                .bind(&enrollment.reference)
                .bind(enrollment.status)
                .bind(enrollment.enrolled_date)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AppError::CommitFailed(format!("enrollment insert failed: {}", e)))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO settlement_journal (transaction_id, settled, updated_at)
            VALUES ($1, TRUE, NOW())
            ON CONFLICT (transaction_id) DO UPDATE
            SET settled = TRUE, updated_at = NOW()
            "#,
        )
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit()
            .await
            .map_err(|e| AppError::CommitFailed(e.to_string()))?;

        Ok(CompletionOutcome {
            transaction,
            balance,
            enrollment,
        })
    }

    async fn commit_cancellation(&self, transaction_id: Uuid) -> Result<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE wallet_transactions
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id, user_id, center_id, course_id, type, payment_method, gateway, currency, amount, reference, status, details, created_at, updated_at
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| {
            AppError::Conflict(format!("transaction '{}' is no longer processing", transaction_id))
        })
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, email, full_name, otp_code, otp_valid, otp_expiration
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn invalidate_otp(&self, user_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE users SET otp_valid = FALSE WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User '{}' not found", user_id)));
        }
        Ok(())
    }

    async fn consume_otp(&self, user_id: Uuid, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET otp_valid = FALSE
            WHERE id = $1 AND otp_code = $2 AND otp_valid AND otp_expiration >= $3
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_course(&self, course_id: Uuid) -> Result<Option<Course>> {
        let row = sqlx::query_as::<_, Course>(
            r#"
            SELECT id, center_id, title, price, currency
            FROM courses
            WHERE id = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
