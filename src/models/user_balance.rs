use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Wallet balance of a user, in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// A user with no balance row reads as an empty wallet.
    pub fn empty(user_id: Uuid) -> Self {
        Self::with_balance(user_id, 0)
    }

    pub fn with_balance(user_id: Uuid, balance: i64) -> Self {
        Self {
            user_id,
            balance,
            updated_at: Utc::now(),
        }
    }

    pub fn has_sufficient_funds(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Applies a signed delta. Returns `None` when the result would go negative.
    pub fn apply_delta(&self, delta: i64) -> Option<UserBalance> {
        let balance = self.balance.checked_add(delta)?;
        if balance < 0 {
            return None;
        }
        Some(Self {
            user_id: self.user_id,
            balance,
            updated_at: Utc::now(),
        })
    }
}
