pub mod course;
pub mod currency;
pub mod enrollment;
pub mod settlement;
pub mod transaction;
pub mod user_balance;
pub mod user_profile;

pub use course::Course;
pub use currency::Currency;
pub use enrollment::{Enrollment, EnrollmentStatus};
pub use settlement::{NotificationKind, SettlementRecord};
pub use transaction::{
    generate_reference, Gateway, PaymentMethod, PendingKey, Transaction, TransactionStatus,
    TransactionType,
};
pub use user_balance::UserBalance;
pub use user_profile::UserProfile;
