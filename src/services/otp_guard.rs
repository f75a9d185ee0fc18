use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::repositories::DirectoryStore;

/// One-time password check gating withdrawals.
pub struct OtpGuard {
    directory: Arc<dyn DirectoryStore>,
}

impl OtpGuard {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Checks `submitted` against the user's stored OTP at instant `now`.
    ///
    /// Checks run in order: match, not yet consumed, not expired. An expired
    /// OTP is invalidated before `OtpExpired` is returned.
    pub async fn validate(&self, user_id: Uuid, submitted: &str, now: DateTime<Utc>) -> Result<()> {
        let user = self
            .directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))?;

        if user.otp_code.as_deref() != Some(submitted) {
            warn!(%user_id, "OTP mismatch");
            return Err(AppError::InvalidOtp);
        }

        if !user.otp_valid {
            warn!(%user_id, "OTP already used");
            return Err(AppError::OtpInvalidated);
        }

        let expired = user.otp_expiration.map_or(true, |expires_at| expires_at < now);
        if expired {
            self.directory.invalidate_otp(user_id).await?;
            warn!(%user_id, "OTP expired and invalidated");
            return Err(AppError::OtpExpired);
        }

        Ok(())
    }

    /// Validates and burns the OTP as one compare-and-set, so of several
    /// requests presenting the same code at most one is authorized.
    ///
    /// When the burn does not happen, the stored OTP is re-read to report why.
    pub async fn redeem(&self, user_id: Uuid, submitted: &str, now: DateTime<Utc>) -> Result<()> {
        if self.directory.consume_otp(user_id, submitted, now).await? {
            info!(%user_id, "OTP consumed");
            return Ok(());
        }

        self.validate(user_id, submitted, now).await?;
        // Redeemable on re-read, so another request burned it first.
        warn!(%user_id, "OTP consumed by a concurrent request");
        Err(AppError::OtpInvalidated)
    }
}
