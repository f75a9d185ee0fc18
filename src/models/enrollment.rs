use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
}

/// A user's seat in a course, created when the enrollment fee settles.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    /// Reference of the fee transaction that paid for this seat.
    pub reference: String,
    pub status: EnrollmentStatus,
    pub enrolled_date: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(user_id: Uuid, course_id: Uuid, reference: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            reference,
            status: EnrollmentStatus::Enrolled,
            enrolled_date: Utc::now(),
        }
    }
}
