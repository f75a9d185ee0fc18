use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::enrollment::EnrollmentHandler;
use super::gateway::GatewayRegistry;
use super::notifier::{compose, Notifier};
use super::otp_guard::OtpGuard;
use crate::error::{AppError, Result};
use crate::models::{
    generate_reference, Currency, Gateway, NotificationKind, PaymentMethod, SettlementRecord,
    Transaction, TransactionType, UserBalance, UserProfile,
};
use crate::observability::{get_metrics, mask_amount, mask_sensitive, LatencyTimer};
use crate::repositories::{CompletionEffects, CompletionOutcome, DirectoryStore, LedgerStore};

/// Request to open a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub user_id: Uuid,
    pub center_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
    /// Reference of the card charge already made on the client.
    pub reference: Option<String>,
}

/// Request to open a withdrawal, authorized by a one-time password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: Uuid,
    pub center_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub otp: String,
}

/// Request to pay for a course. Amount and currency come from the course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentFeeRequest {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_method: PaymentMethod,
    pub gateway: Option<Gateway>,
}

fn validate_amount(amount: i64, currency: &str) -> Result<()> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    Currency::from_str(currency).map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(())
}

/// A gateway is required for card payments and meaningless otherwise.
fn validate_gateway(payment_method: PaymentMethod, gateway: Option<Gateway>) -> Result<()> {
    match (payment_method, gateway) {
        (PaymentMethod::Card, None) => Err(AppError::Validation(
            "gateway is required for card payments".to_string(),
        )),
        (PaymentMethod::Wallet, Some(_)) => Err(AppError::Validation(
            "gateway is only accepted for card payments".to_string(),
        )),
        _ => Ok(()),
    }
}

fn completion_notifications(transaction_type: TransactionType) -> &'static [NotificationKind] {
    match transaction_type {
        TransactionType::Deposit => &[NotificationKind::DepositReceipt],
        TransactionType::Withdrawal => &[NotificationKind::WithdrawalReceipt],
        TransactionType::EnrollmentFee => &EnrollmentHandler::COMPLETION_NOTIFICATIONS,
    }
}

/// The transaction state machine.
///
/// Owns every `processing → completed | cancelled` transition. Outbound
/// gateway and notifier calls are awaited on the request path; any failure
/// leaves the transaction `processing` for the caller to retry.
pub struct TransactionService {
    ledger: Arc<dyn LedgerStore>,
    directory: Arc<dyn DirectoryStore>,
    gateways: GatewayRegistry,
    notifier: Arc<dyn Notifier>,
    otp_guard: OtpGuard,
    sender: String,
}

impl TransactionService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        directory: Arc<dyn DirectoryStore>,
        gateways: GatewayRegistry,
        notifier: Arc<dyn Notifier>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            otp_guard: OtpGuard::new(directory.clone()),
            ledger,
            directory,
            gateways,
            notifier,
            sender: sender.into(),
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_deposit(&self, request: DepositRequest) -> Result<Transaction> {
        let result = self.open_deposit(request).await;
        self.track_rejection("create_deposit", &result);
        result
    }

    async fn open_deposit(&self, request: DepositRequest) -> Result<Transaction> {
        validate_amount(request.amount, &request.currency)?;
        let reference = request.reference.filter(|r| !r.trim().is_empty());
        if request.payment_method == PaymentMethod::Card && reference.is_none() {
            return Err(AppError::MissingReference);
        }
        validate_gateway(request.payment_method, request.gateway)?;
        self.load_user(request.user_id).await?;

        if let Some(existing) = self
            .ledger
            .find_pending(request.user_id, TransactionType::Deposit, None)
            .await?
        {
            return Err(AppError::PendingExists(Box::new(existing)));
        }

        let reference = reference.unwrap_or_else(|| generate_reference(TransactionType::Deposit));
        let transaction = Transaction::new(
            request.user_id,
            request.center_id,
            TransactionType::Deposit,
            request.payment_method,
            request.gateway,
            request.currency.to_uppercase(),
            request.amount,
            reference,
        )
        .with_details("Wallet deposit");

        self.insert(transaction).await
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_withdrawal(&self, request: WithdrawalRequest) -> Result<Transaction> {
        let result = self.open_withdrawal(request).await;
        self.track_rejection("create_withdrawal", &result);
        result
    }

    async fn open_withdrawal(&self, request: WithdrawalRequest) -> Result<Transaction> {
        validate_amount(request.amount, &request.currency)?;

        // Burned before anything else can fail, so a rejected attempt still uses it up.
        self.otp_guard
            .redeem(request.user_id, &request.otp, Utc::now())
            .await?;

        if let Some(existing) = self
            .ledger
            .find_pending(request.user_id, TransactionType::Withdrawal, None)
            .await?
        {
            return Err(AppError::PendingExists(Box::new(existing)));
        }

        let balance = self.ledger.get_balance(request.user_id).await?;
        if !balance.has_sufficient_funds(request.amount) {
            return Err(AppError::InsufficientBalance {
                requested: request.amount,
                available: balance.balance,
            });
        }

        let transaction = Transaction::new(
            request.user_id,
            request.center_id,
            TransactionType::Withdrawal,
            PaymentMethod::Wallet,
            None,
            request.currency.to_uppercase(),
            request.amount,
            generate_reference(TransactionType::Withdrawal),
        )
        .with_details("Wallet withdrawal");

        self.insert(transaction).await
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, course_id = %request.course_id))]
    pub async fn create_enrollment_fee(&self, request: EnrollmentFeeRequest) -> Result<Transaction> {
        let result = self.open_enrollment_fee(request).await;
        self.track_rejection("create_enrollment_fee", &result);
        result
    }

    async fn open_enrollment_fee(&self, request: EnrollmentFeeRequest) -> Result<Transaction> {
        // Fees settle to the center, never from the wallet, so only a verified card charge pays one.
        if request.payment_method != PaymentMethod::Card {
            return Err(AppError::Validation(
                "enrollment fees must be paid by card".to_string(),
            ));
        }
        validate_gateway(request.payment_method, request.gateway)?;
        self.load_user(request.user_id).await?;

        let course = self
            .directory
            .find_course(request.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course '{}' not found", request.course_id)))?;
        validate_amount(course.price, &course.currency)?;

        EnrollmentHandler::ensure_not_enrolled(self.ledger.as_ref(), request.user_id, course.id).await?;

        if let Some(existing) = self
            .ledger
            .find_pending(request.user_id, TransactionType::EnrollmentFee, Some(course.id))
            .await?
        {
            return Err(AppError::PendingExists(Box::new(existing)));
        }

        let transaction = Transaction::new(
            request.user_id,
            course.center_id,
            TransactionType::EnrollmentFee,
            request.payment_method,
            request.gateway,
            course.currency.to_uppercase(),
            course.price,
            generate_reference(TransactionType::EnrollmentFee),
        )
        .with_course(course.id)
        .with_details(format!("Enrollment fee for {}", course.title));

        self.insert(transaction).await
    }

    async fn insert(&self, transaction: Transaction) -> Result<Transaction> {
        let created = self.ledger.insert(&transaction).await?;

        get_metrics().record_transaction_created(created.transaction_type.as_str(), &created.currency);
        info!(
            transaction_id = %created.id,
            transaction_type = %created.transaction_type,
            amount = %mask_amount(created.amount),
            reference = %mask_sensitive(&created.reference, 4),
            "Transaction created"
        );
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn complete_deposit(&self, transaction_id: Uuid) -> Result<CompletionOutcome> {
        let result = self.complete_by_id(transaction_id, TransactionType::Deposit).await;
        self.track_rejection("complete_deposit", &result);
        result
    }

    #[instrument(skip(self))]
    pub async fn complete_withdrawal(&self, transaction_id: Uuid) -> Result<CompletionOutcome> {
        let result = self.complete_by_id(transaction_id, TransactionType::Withdrawal).await;
        self.track_rejection("complete_withdrawal", &result);
        result
    }

    /// Fees are completed by the reference the client paid with.
    #[instrument(skip(self, reference))]
    pub async fn complete_enrollment_fee(&self, reference: &str) -> Result<CompletionOutcome> {
        let result = self.complete_by_reference(reference).await;
        self.track_rejection("complete_enrollment_fee", &result);
        result
    }

    async fn complete_by_id(&self, transaction_id: Uuid, expected: TransactionType) -> Result<CompletionOutcome> {
        let found = self.ledger.find_by_id(transaction_id).await?;
        let transaction = Self::expect_pending(found, expected, &transaction_id.to_string())?;
        self.complete(transaction).await
    }

    async fn complete_by_reference(&self, reference: &str) -> Result<CompletionOutcome> {
        let found = self.ledger.find_by_reference(reference).await?;
        let transaction = Self::expect_pending(found, TransactionType::EnrollmentFee, reference)?;
        self.complete(transaction).await
    }

    async fn complete(&self, transaction: Transaction) -> Result<CompletionOutcome> {
        let mut journal = self
            .ledger
            .find_settlement(transaction.id)
            .await?
            .unwrap_or_else(|| SettlementRecord::new(transaction.id));

        if transaction.payment_method == PaymentMethod::Card && !journal.is_verified() {
            let (amount, status) = self.verify_charge(&transaction).await?;
            journal.record_verification(amount, status);
            self.ledger.save_settlement(&journal).await?;
        }

        if transaction.transaction_type == TransactionType::Withdrawal {
            // The balance may have moved since the withdrawal was opened.
            let balance = self.ledger.get_balance(transaction.user_id).await?;
            if !balance.has_sufficient_funds(transaction.amount) {
                return Err(AppError::InsufficientBalance {
                    requested: transaction.amount,
                    available: balance.balance,
                });
            }
        }

        let effects = match transaction.transaction_type {
            TransactionType::EnrollmentFee => EnrollmentHandler::completion_effects(&transaction)?,
            other => CompletionEffects::none().with_balance_delta(other.balance_delta(transaction.amount)),
        };

        let user = self.load_user(transaction.user_id).await?;
        let course_title = self.course_title(&transaction).await?;
        for &kind in completion_notifications(transaction.transaction_type) {
            if journal.has_sent(kind) {
                continue;
            }
            self.notify(kind, &user, &transaction, course_title.as_deref()).await?;
            journal.mark_sent(kind);
            self.ledger.save_settlement(&journal).await?;
        }

        let timer = LatencyTimer::new();
        let outcome = self
            .ledger
            .commit_completion(transaction.id, effects)
            .await
            .map_err(|e| match e {
                AppError::Database(e) => AppError::CommitFailed(e.to_string()),
                other => other,
            })?;
        get_metrics().record_commit_latency(timer.elapsed_ms());
        get_metrics().record_transaction_completed(transaction.transaction_type.as_str(), &transaction.currency);

        info!(
            transaction_id = %transaction.id,
            transaction_type = %transaction.transaction_type,
            balance = ?outcome.balance.as_ref().map(|b| b.balance),
            enrolled = outcome.enrollment.is_some(),
            "Transaction completed"
        );
        Ok(outcome)
    }

    /// Confirms the card charge and applies the gateway-specific post-check.
    async fn verify_charge(&self, transaction: &Transaction) -> Result<(i64, String)> {
        let gateway = transaction.gateway.ok_or_else(|| {
            AppError::InvalidState(format!("card transaction '{}' has no gateway", transaction.id))
        })?;

        let timer = LatencyTimer::new();
        let result = self
            .gateways
            .verify(gateway, &transaction.reference)
            .await
            .map_err(|e| match e {
                AppError::VerificationFailed(_) => e,
                other => AppError::VerificationFailed(other.to_string()),
            });
        get_metrics().record_gateway_verification(
            gateway.as_str(),
            timer.elapsed_ms(),
            matches!(&result, Ok(r) if r.success),
        );
        let result = result?;

        if !result.success {
            warn!(
                transaction_id = %transaction.id,
                gateway = gateway.as_str(),
                status = %result.status,
                "Gateway did not confirm payment"
            );
            return Err(AppError::VerificationFailed(format!(
                "gateway {} reported status '{}'",
                gateway.as_str(),
                result.status
            )));
        }

        if gateway.requires_amount_check() && result.amount < transaction.amount {
            return Err(AppError::AmountMismatch {
                expected: transaction.amount,
                verified: result.amount,
            });
        }

        Ok((result.amount, result.status))
    }

    #[instrument(skip(self))]
    pub async fn cancel_deposit(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.cancel(transaction_id, TransactionType::Deposit, "cancel_deposit").await
    }

    #[instrument(skip(self))]
    pub async fn cancel_withdrawal(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.cancel(transaction_id, TransactionType::Withdrawal, "cancel_withdrawal").await
    }

    #[instrument(skip(self))]
    pub async fn cancel_enrollment_fee(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.cancel(transaction_id, TransactionType::EnrollmentFee, "cancel_enrollment_fee").await
    }

    async fn cancel(
        &self,
        transaction_id: Uuid,
        expected: TransactionType,
        operation: &str,
    ) -> Result<Transaction> {
        let result = self.cancel_pending(transaction_id, expected).await;
        self.track_rejection(operation, &result);
        result
    }

    async fn cancel_pending(&self, transaction_id: Uuid, expected: TransactionType) -> Result<Transaction> {
        let found = self.ledger.find_by_id(transaction_id).await?;
        let transaction = Self::expect_pending(found, expected, &transaction_id.to_string())?;

        let user = self.load_user(transaction.user_id).await?;
        let course_title = self.course_title(&transaction).await?;
        self.notify(NotificationKind::Cancellation, &user, &transaction, course_title.as_deref())
            .await?;

        let cancelled = self.ledger.commit_cancellation(transaction.id).await?;
        get_metrics().record_transaction_cancelled(cancelled.transaction_type.as_str());
        info!(transaction_id = %cancelled.id, transaction_type = %cancelled.transaction_type, "Transaction cancelled");
        Ok(cancelled)
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.ledger
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", transaction_id)))
    }

    pub async fn list_user_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.ledger.list_for_user(user_id).await
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<UserBalance> {
        self.ledger.get_balance(user_id).await
    }

    fn expect_pending(
        found: Option<Transaction>,
        expected: TransactionType,
        lookup: &str,
    ) -> Result<Transaction> {
        match found {
            Some(tx) if tx.transaction_type == expected && tx.is_processing() => Ok(tx),
            Some(tx) if tx.transaction_type != expected => Err(AppError::NotPending(format!(
                "'{}' is a {} transaction, not a {}",
                lookup, tx.transaction_type, expected
            ))),
            Some(tx) => Err(AppError::NotPending(format!(
                "{} '{}' is already {:?}",
                expected, lookup, tx.status
            ))),
            None => Err(AppError::NotPending(format!("{} '{}' not found", expected, lookup))),
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<UserProfile> {
        self.directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))
    }

    async fn course_title(&self, transaction: &Transaction) -> Result<Option<String>> {
        match transaction.course_id {
            Some(course_id) => Ok(self.directory.find_course(course_id).await?.map(|c| c.title)),
            None => Ok(None),
        }
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        user: &UserProfile,
        transaction: &Transaction,
        course_title: Option<&str>,
    ) -> Result<()> {
        let email = compose(kind, &self.sender, user, transaction, course_title);
        let result = self.notifier.send(&email).await;
        get_metrics().record_notification(kind.as_str(), result.is_ok());

        result.map_err(|e| {
            warn!(transaction_id = %transaction.id, kind = kind.as_str(), error = %e, "Notification failed, commit skipped");
            match e {
                AppError::NotificationFailed(_) => e,
                other => AppError::NotificationFailed(other.to_string()),
            }
        })
    }

    fn track_rejection<T>(&self, operation: &str, result: &Result<T>) {
        if let Err(e) = result {
            get_metrics().record_transaction_rejected(operation, e.code());
            if e.is_internal() {
                tracing::error!(operation, error = %e, "Operation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Course, TransactionStatus};
    use crate::repositories::ledger_store::MockLedgerStore;
    use crate::repositories::InMemoryStore;
    use crate::services::gateway::{MockGatewayVerifier, VerificationResult};
    use crate::services::notifier::MockNotifier;
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        user: UserProfile,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let user = UserProfile::new("ada@example.com", "Ada").with_otp("424242", Duration::minutes(5));
        store.put_user(user.clone()).await;
        Fixture { store, user }
    }

    fn service(
        store: &Arc<InMemoryStore>,
        verifier: MockGatewayVerifier,
        notifier: MockNotifier,
    ) -> TransactionService {
        let gateways = GatewayRegistry::new()
            .with(Gateway::A, Arc::new(verifier))
            .with(Gateway::B, Arc::new(MockGatewayVerifier::new()));
        TransactionService::new(store.clone(), store.clone(), gateways, Arc::new(notifier), "noreply@example.com")
    }

    fn ok_notifier(times: usize) -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(times).returning(|_| Ok(()));
        notifier
    }

    fn card_deposit(user_id: Uuid) -> DepositRequest {
        DepositRequest {
            user_id,
            center_id: Uuid::new_v4(),
            amount: 5_000,
            currency: "NGN".to_string(),
            payment_method: PaymentMethod::Card,
            gateway: Some(Gateway::A),
            reference: Some("PSK-abc123".to_string()),
        }
    }

    #[tokio::test]
    async fn test_card_deposit_requires_reference() {
        let f = fixture().await;
        let svc = service(&f.store, MockGatewayVerifier::new(), MockNotifier::new());

        let mut request = card_deposit(f.user.id);
        request.reference = None;
        assert!(matches!(svc.create_deposit(request).await, Err(AppError::MissingReference)));
    }

    #[tokio::test]
    async fn test_card_deposit_verified_and_credited() {
        let f = fixture().await;
        let mut verifier = MockGatewayVerifier::new();
        verifier
            .expect_verify()
            .withf(|reference| reference.to_string() == "PSK-abc123")
            .times(1)
            .returning(|_| Ok(VerificationResult::successful(5_000)));
        let svc = service(&f.store, verifier, ok_notifier(1));

        let tx = svc.create_deposit(card_deposit(f.user.id)).await.unwrap();
        assert_eq!(tx.reference, "PSK-abc123");

        let outcome = svc.complete_deposit(tx.id).await.unwrap();
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(outcome.balance.unwrap().balance, 5_000);
    }

    #[tokio::test]
    async fn test_failed_verification_keeps_processing() {
        let f = fixture().await;
        let mut verifier = MockGatewayVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Ok(VerificationResult::failed("abandoned")));
        let svc = service(&f.store, verifier, MockNotifier::new());

        let tx = svc.create_deposit(card_deposit(f.user.id)).await.unwrap();
        let err = svc.complete_deposit(tx.id).await.unwrap_err();

        assert!(matches!(err, AppError::VerificationFailed(_)));
        assert!(err.to_string().contains("abandoned"));
        let stored = svc.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Processing);
        assert_eq!(svc.get_balance(f.user.id).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_gateway_b_amount_mismatch() {
        let f = fixture().await;
        let mut verifier_b = MockGatewayVerifier::new();
        verifier_b
            .expect_verify()
            .returning(|_| Ok(VerificationResult::successful(4_999)));
        let gateways = GatewayRegistry::new().with(Gateway::B, Arc::new(verifier_b));
        let svc = TransactionService::new(
            f.store.clone(),
            f.store.clone(),
            gateways,
            Arc::new(MockNotifier::new()),
            "noreply@example.com",
        );

        let mut request = card_deposit(f.user.id);
        request.gateway = Some(Gateway::B);
        let tx = svc.create_deposit(request).await.unwrap();

        let err = svc.complete_deposit(tx.id).await.unwrap_err();
        assert!(matches!(err, AppError::AmountMismatch { expected: 5_000, verified: 4_999 }));
    }

    #[tokio::test]
    async fn test_gateway_a_skips_amount_check() {
        let f = fixture().await;
        let mut verifier = MockGatewayVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Ok(VerificationResult::successful(1)));
        let svc = service(&f.store, verifier, ok_notifier(1));

        let tx = svc.create_deposit(card_deposit(f.user.id)).await.unwrap();
        assert!(svc.complete_deposit(tx.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_retry_after_notification_failure_does_not_reverify() {
        let f = fixture().await;
        let mut verifier = MockGatewayVerifier::new();
        verifier
            .expect_verify()
            .times(1)
            .returning(|_| Ok(VerificationResult::successful(5_000)));

        let mut notifier = MockNotifier::new();
        let mut attempts = 0;
        notifier.expect_send().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(AppError::NotificationFailed("mailer down".to_string()))
            } else {
                Ok(())
            }
        });
        let svc = service(&f.store, verifier, notifier);

        let tx = svc.create_deposit(card_deposit(f.user.id)).await.unwrap();
        assert!(matches!(
            svc.complete_deposit(tx.id).await,
            Err(AppError::NotificationFailed(_))
        ));
        assert_eq!(svc.get_balance(f.user.id).await.unwrap().balance, 0);

        let outcome = svc.complete_deposit(tx.id).await.unwrap();
        assert_eq!(outcome.balance.unwrap().balance, 5_000);
    }

    #[tokio::test]
    async fn test_enrollment_fee_retry_sends_only_missing_notification() {
        let f = fixture().await;
        let course = Course::new(Uuid::new_v4(), "Rust for Analysts", 20_000, "NGN");
        f.store.put_course(course.clone()).await;

        let mut verifier = MockGatewayVerifier::new();
        verifier
            .expect_verify()
            .times(1)
            .returning(|_| Ok(VerificationResult::successful(20_000)));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|email| email.subject == "Payment received")
            .times(1)
            .returning(|_| Ok(()));
        let mut welcome_attempts = 0;
        notifier
            .expect_send()
            .withf(|email| email.subject.starts_with("Welcome"))
            .times(2)
            .returning(move |_| {
                welcome_attempts += 1;
                if welcome_attempts == 1 {
                    Err(AppError::NotificationFailed("bounced".to_string()))
                } else {
                    Ok(())
                }
            });
        let svc = service(&f.store, verifier, notifier);

        let tx = svc
            .create_enrollment_fee(EnrollmentFeeRequest {
                user_id: f.user.id,
                course_id: course.id,
                payment_method: PaymentMethod::Card,
                gateway: Some(Gateway::A),
            })
            .await
            .unwrap();
        assert_eq!(tx.amount, 20_000);
        assert_eq!(tx.center_id, course.center_id);

        assert!(svc.complete_enrollment_fee(&tx.reference).await.is_err());
        assert!(f.store.enrollments_for(f.user.id).await.is_empty());

        let outcome = svc.complete_enrollment_fee(&tx.reference).await.unwrap();
        assert_eq!(outcome.enrollment.unwrap().reference, tx.reference);
        assert!(outcome.balance.is_none());
    }

    #[tokio::test]
    async fn test_withdrawal_burns_otp_even_when_rejected() {
        let f = fixture().await;
        f.store.set_balance(f.user.id, 100).await;
        let svc = service(&f.store, MockGatewayVerifier::new(), MockNotifier::new());

        let request = WithdrawalRequest {
            user_id: f.user.id,
            center_id: Uuid::new_v4(),
            amount: 200,
            currency: "NGN".to_string(),
            otp: "424242".to_string(),
        };
        assert!(matches!(
            svc.create_withdrawal(request.clone()).await,
            Err(AppError::InsufficientBalance { requested: 200, available: 100 })
        ));
        assert!(matches!(
            svc.create_withdrawal(WithdrawalRequest { amount: 50, ..request }).await,
            Err(AppError::OtpInvalidated)
        ));
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let f = fixture().await;
        let tx = Transaction::new(
            f.user.id,
            Uuid::new_v4(),
            TransactionType::Deposit,
            PaymentMethod::Wallet,
            None,
            "NGN".to_string(),
            500,
            generate_reference(TransactionType::Deposit),
        );

        let mut ledger = MockLedgerStore::new();
        let found = tx.clone();
        ledger.expect_find_by_id().returning(move |_| Ok(Some(found.clone())));
        ledger.expect_find_settlement().returning(|_| Ok(None));
        ledger.expect_save_settlement().returning(|_| Ok(()));
        ledger
            .expect_commit_completion()
            .times(1)
            .returning(|_, _| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let svc = TransactionService::new(
            Arc::new(ledger),
            f.store.clone(),
            GatewayRegistry::new(),
            Arc::new(ok_notifier(1)),
            "noreply@example.com",
        );

        let err = svc.complete_deposit(tx.id).await.unwrap_err();
        assert!(matches!(err, AppError::CommitFailed(_)));
    }

    #[tokio::test]
    async fn test_complete_wrong_type_is_not_pending() {
        let f = fixture().await;
        let svc = service(&f.store, MockGatewayVerifier::new(), MockNotifier::new());
        let tx = svc
            .create_deposit(DepositRequest {
                payment_method: PaymentMethod::Wallet,
                gateway: None,
                reference: None,
                ..card_deposit(f.user.id)
            })
            .await
            .unwrap();

        assert!(matches!(svc.complete_withdrawal(tx.id).await, Err(AppError::NotPending(_))));
        assert!(matches!(svc.cancel_enrollment_fee(tx.id).await, Err(AppError::NotPending(_))));
    }

    #[test]
    fn test_gateway_iff_card() {
        assert!(validate_gateway(PaymentMethod::Card, Some(Gateway::A)).is_ok());
        assert!(validate_gateway(PaymentMethod::Wallet, None).is_ok());
        assert!(validate_gateway(PaymentMethod::Card, None).is_err());
        assert!(validate_gateway(PaymentMethod::Wallet, Some(Gateway::B)).is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1, "NGN").is_ok());
        assert!(validate_amount(0, "NGN").is_err());
        assert!(validate_amount(10, "XXX").is_err());
    }
}
