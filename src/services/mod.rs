pub mod enrollment;
pub mod gateway;
pub mod notifier;
pub mod otp_guard;
pub mod transaction_service;

pub use enrollment::EnrollmentHandler;
pub use gateway::{GatewayRegistry, GatewayVerifier, HttpGatewayVerifier, VerificationResult};
pub use notifier::{compose, Attachment, Email, HttpNotifier, Notifier};
pub use otp_guard::OtpGuard;
pub use transaction_service::{DepositRequest, EnrollmentFeeRequest, TransactionService, WithdrawalRequest};
