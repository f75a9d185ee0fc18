use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Course as seen by the payments module. The price is authoritative for fees.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub center_id: Uuid,
    pub title: String,
    /// Price in minor units.
    pub price: i64,
    pub currency: String,
}

impl Course {
    pub fn new(center_id: Uuid, title: impl Into<String>, price: i64, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            center_id,
            title: title.into(),
            price,
            currency: currency.into(),
        }
    }
}
