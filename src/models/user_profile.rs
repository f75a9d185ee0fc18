use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The slice of a user record the payments module reads: contact details and OTP state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    pub otp_valid: bool,
    pub otp_expiration: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            full_name: full_name.into(),
            otp_code: None,
            otp_valid: false,
            otp_expiration: None,
        }
    }

    /// Issues a fresh OTP valid for `ttl`.
    pub fn with_otp(mut self, code: impl Into<String>, ttl: Duration) -> Self {
        self.otp_code = Some(code.into());
        self.otp_valid = true;
        self.otp_expiration = Some(Utc::now() + ttl);
        self
    }
}
