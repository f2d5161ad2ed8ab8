//! Persistence seams for the registration service
//!
//! Each concern has its own trait so services (and tests) can depend on the
//! narrowest one. `Store` bundles them for the application state.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use reunion_common::{ContactMessage, OtpVerification, Registration, Result, Transaction};
use serde::Serialize;

/// What a cascade delete removed besides the registration itself
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub registration_id: String,
    pub otp_records_deleted: usize,
    pub transactions_deleted: usize,
}

/// Outcome of an idempotent payment write
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentWrite {
    Recorded,
    /// The idempotency key was already used; nothing was written
    Replayed(Transaction),
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Insert a new registration. Fails with `Conflict` when a registration
    /// already exists for the same normalized email.
    async fn create_registration(&self, registration: &Registration) -> Result<()>;

    async fn get_registration(&self, id: &str) -> Result<Option<Registration>>;

    /// Newest registration for a normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<Registration>>;

    async fn find_by_contact(&self, contact_number: &str) -> Result<Vec<Registration>>;

    /// Overwrite an existing registration. `NotFound` when it is gone.
    async fn save_registration(&self, registration: &Registration) -> Result<()>;

    async fn list_registrations(&self) -> Result<Vec<Registration>>;

    /// Delete a registration together with the OTP records sharing its email
    /// or contact number and the transactions referencing it, in one atomic
    /// step. `None` when the registration does not exist.
    async fn delete_registration_cascade(&self, id: &str) -> Result<Option<CascadeReport>>;
}

#[async_trait]
pub trait SerialStore: Send + Sync {
    /// Serial of a registration; `NotFound` when the registration is missing
    async fn current_serial(&self, id: &str) -> Result<Option<u64>>;

    /// Highest assigned serial, 0 when none
    async fn max_serial(&self) -> Result<u64>;

    /// Claim `serial` for registration `id`, releasing any serial it held.
    /// Returns false when another registration already holds it.
    async fn claim_serial(&self, id: &str, serial: u64) -> Result<bool>;

    /// Registrations without a serial, oldest first
    async fn unserialized_ids(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Remove every record sharing either identifier with `record`, then
    /// store it.
    async fn replace_otp(&self, record: &OtpVerification) -> Result<()>;

    /// Newest record for the identity; both identifiers must match when both
    /// are given.
    async fn find_otp(
        &self,
        email: Option<&str>,
        contact_number: Option<&str>,
    ) -> Result<Option<OtpVerification>>;

    async fn save_otp(&self, record: &OtpVerification) -> Result<()>;

    async fn delete_otp(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Write `transaction` and, when given, the updated registration as one
    /// atomic step guarded by the transaction's idempotency key.
    async fn record_payment(
        &self,
        transaction: &Transaction,
        registration: Option<&Registration>,
    ) -> Result<PaymentWrite>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>>;

    async fn transactions_for(&self, registration_id: &str) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn create_message(&self, message: &ContactMessage) -> Result<()>;

    async fn get_message(&self, id: &str) -> Result<Option<ContactMessage>>;

    async fn save_message(&self, message: &ContactMessage) -> Result<()>;

    async fn list_messages(&self) -> Result<Vec<ContactMessage>>;
}

/// Everything the HTTP layer needs from storage
pub trait Store:
    RegistrationStore + SerialStore + OtpStore + TransactionStore + ContactStore
{
}

impl<T> Store for T where
    T: RegistrationStore + SerialStore + OtpStore + TransactionStore + ContactStore
{
}
