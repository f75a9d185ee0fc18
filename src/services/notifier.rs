use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::NotifierSettings;
use crate::error::{AppError, Result};
use crate::models::currency::display_amount;
use crate::models::{NotificationKind, Transaction, TransactionType, UserProfile};
use crate::observability::mask_sensitive;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

/// Outgoing email, in the shape the mail relay accepts on `POST /send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attachments: Vec<Attachment>,
}

/// Sends transactional email. A returned error means the email was not accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Builds the email body for a lifecycle notification.
pub fn compose(
    kind: NotificationKind,
    from: &str,
    user: &UserProfile,
    transaction: &Transaction,
    course_title: Option<&str>,
) -> Email {
    let amount = display_amount(transaction.amount, &transaction.currency);
    let course = course_title.unwrap_or("your course");

    let (subject, text) = match kind {
        NotificationKind::DepositReceipt => (
            "Deposit successful".to_string(),
            format!("Your wallet has been credited with {}. Reference: {}.", amount, transaction.reference),
        ),
        NotificationKind::WithdrawalReceipt => (
            "Withdrawal successful".to_string(),
            format!("{} has been withdrawn from your wallet. Reference: {}.", amount, transaction.reference),
        ),
        NotificationKind::FeeReceipt => (
            "Payment received".to_string(),
            format!("We received your payment of {} for {}. Reference: {}.", amount, course, transaction.reference),
        ),
        NotificationKind::EnrollmentWelcome => (
            format!("Welcome to {}", course),
            format!("You are now enrolled in {}. We are glad to have you.", course),
        ),
        NotificationKind::Cancellation => {
            let what = match transaction.transaction_type {
                TransactionType::Deposit => "deposit",
                TransactionType::Withdrawal => "withdrawal",
                TransactionType::EnrollmentFee => "enrollment payment",
            };
            (
                format!("Your {} was cancelled", what),
                format!("Your {} of {} (reference {}) has been cancelled.", what, amount, transaction.reference),
            )
        }
    };

    let html = format!("<p>Hello {},</p><p>{}</p>", user.full_name, text);
    Email {
        from: from.to_string(),
        to: user.email.clone(),
        subject,
        text: format!("Hello {},\n\n{}", user.full_name, text),
        html,
        attachments: Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Interprets the relay response. `success: true` with `data: null` is a failure.
fn check_send_response(body: &[u8]) -> Result<()> {
    let response: SendResponse = serde_json::from_slice(body)
        .map_err(|e| AppError::NotificationFailed(format!("malformed mailer response: {}", e)))?;

    match (response.success, response.data) {
        (true, Some(data)) if !data.is_null() => Ok(()),
        (true, _) => Err(AppError::NotificationFailed(
            "mailer reported success without a delivery record".to_string(),
        )),
        (false, _) => Err(AppError::NotificationFailed(
            response.message.unwrap_or_else(|| "mailer rejected the message".to_string()),
        )),
    }
}

/// Notifier posting to `{base_url}/send` with an `x-api-key` header.
pub struct HttpNotifier {
    client: reqwest::Client,
    send_url: String,
    api_key: String,
}

impl HttpNotifier {
    pub fn new(settings: &NotifierSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            send_url: format!("{}/send", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        debug!(to = %mask_sensitive(&email.to, 3), subject = %email.subject, "Sending email");

        let response = self
            .client
            .post(&self.send_url)
            .header("x-api-key", &self.api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Mailer request failed");
                AppError::NotificationFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::NotificationFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::NotificationFailed(format!(
                "mailer responded {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        check_send_response(&body)
    }
}
