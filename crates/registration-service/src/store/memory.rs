//! In-memory store for development and tests
//!
//! Mirrors the Redis backend's semantics (unique email, unique serials,
//! atomic cascade and payment writes) behind a single lock.

use async_trait::async_trait;
use reunion_common::{
    normalize_email, ContactMessage, Error, OtpVerification, Registration, Result, Transaction,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    CascadeReport, ContactStore, OtpStore, PaymentWrite, RegistrationStore, SerialStore,
    TransactionStore,
};

#[derive(Default)]
struct State {
    registrations: HashMap<String, Registration>,
    serials: HashMap<u64, String>,
    otps: HashMap<String, OtpVerification>,
    transactions: HashMap<String, Transaction>,
    /// idempotency key -> transaction id
    idempotency: HashMap<String, String>,
    messages: HashMap<String, ContactMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed registrations as-is, bypassing the unique email check. Used to
    /// load legacy data that predates the constraint.
    pub fn with_registrations(registrations: Vec<Registration>) -> Self {
        let mut state = State::default();
        for registration in registrations {
            if let Some(serial) = registration.serial_number {
                state.serials.insert(serial, registration.id.clone());
            }
            state
                .registrations
                .insert(registration.id.clone(), registration);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Insert an OTP record without touching others
    pub async fn insert_otp(&self, record: OtpVerification) {
        self.state
            .write()
            .await
            .otps
            .insert(record.id.clone(), record);
    }

    /// Insert a transaction without touching any registration
    pub async fn insert_transaction(&self, transaction: Transaction) {
        let mut state = self.state.write().await;
        state.idempotency.insert(
            transaction.idempotency_key.clone(),
            transaction.transaction_id.clone(),
        );
        state
            .transactions
            .insert(transaction.transaction_id.clone(), transaction);
    }

    pub async fn otp_count(&self) -> usize {
        self.state.read().await.otps.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

fn newest(registrations: impl Iterator<Item = Registration>) -> Option<Registration> {
    registrations.max_by(|a, b| {
        (a.registration_date, a.last_updated).cmp(&(b.registration_date, b.last_updated))
    })
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_registration(&self, registration: &Registration) -> Result<()> {
        let mut state = self.state.write().await;
        let email = normalize_email(&registration.email);
        if state
            .registrations
            .values()
            .any(|r| normalize_email(&r.email) == email)
        {
            return Err(Error::conflict(format!(
                "A registration already exists for {}",
                email
            )));
        }
        state
            .registrations
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn get_registration(&self, id: &str) -> Result<Option<Registration>> {
        Ok(self.state.read().await.registrations.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registration>> {
        let email = normalize_email(email);
        let state = self.state.read().await;
        Ok(newest(
            state
                .registrations
                .values()
                .filter(|r| normalize_email(&r.email) == email)
                .cloned(),
        ))
    }

    async fn find_by_contact(&self, contact_number: &str) -> Result<Vec<Registration>> {
        let state = self.state.read().await;
        Ok(state
            .registrations
            .values()
            .filter(|r| r.contact_number == contact_number)
            .cloned()
            .collect())
    }

    async fn save_registration(&self, registration: &Registration) -> Result<()> {
        let mut state = self.state.write().await;
        match state.registrations.get_mut(&registration.id) {
            Some(slot) => {
                let serial = slot.serial_number;
                *slot = registration.clone();
                slot.serial_number = serial;
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "Registration {} not found",
                registration.id
            ))),
        }
    }

    async fn list_registrations(&self) -> Result<Vec<Registration>> {
        Ok(self
            .state
            .read()
            .await
            .registrations
            .values()
            .cloned()
            .collect())
    }

    async fn delete_registration_cascade(&self, id: &str) -> Result<Option<CascadeReport>> {
        let mut state = self.state.write().await;
        let Some(registration) = state.registrations.remove(id) else {
            return Ok(None);
        };

        if let Some(serial) = registration.serial_number {
            if state.serials.get(&serial).map(String::as_str) == Some(id) {
                state.serials.remove(&serial);
            }
        }

        let email = Some(registration.email.as_str());
        let contact = Some(registration.contact_number.as_str()).filter(|c| !c.is_empty());
        let before = state.otps.len();
        state.otps.retain(|_, otp| !otp.overlaps(email, contact));
        let otp_records_deleted = before - state.otps.len();

        let doomed: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.registration_id.as_deref() == Some(id))
            .cloned()
            .collect();
        for transaction in &doomed {
            state.transactions.remove(&transaction.transaction_id);
            state.idempotency.remove(&transaction.idempotency_key);
        }

        debug!(
            "Cascade deleted registration {} ({} OTP, {} transactions)",
            id,
            otp_records_deleted,
            doomed.len()
        );

        Ok(Some(CascadeReport {
            registration_id: id.to_string(),
            otp_records_deleted,
            transactions_deleted: doomed.len(),
        }))
    }
}

#[async_trait]
impl SerialStore for MemoryStore {
    async fn current_serial(&self, id: &str) -> Result<Option<u64>> {
        self.state
            .read()
            .await
            .registrations
            .get(id)
            .map(|r| r.serial_number)
            .ok_or_else(|| Error::not_found(format!("Registration {} not found", id)))
    }

    async fn max_serial(&self) -> Result<u64> {
        Ok(self
            .state
            .read()
            .await
            .serials
            .keys()
            .copied()
            .max()
            .unwrap_or(0))
    }

    async fn claim_serial(&self, id: &str, serial: u64) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.serials.contains_key(&serial) {
            return Ok(false);
        }

        let previous = match state.registrations.get_mut(id) {
            Some(registration) => registration.serial_number.replace(serial),
            None => return Err(Error::not_found(format!("Registration {} not found", id))),
        };
        if let Some(previous) = previous {
            state.serials.remove(&previous);
        }
        state.serials.insert(serial, id.to_string());
        Ok(true)
    }

    async fn unserialized_ids(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut pending: Vec<&Registration> = state
            .registrations
            .values()
            .filter(|r| r.serial_number.is_none())
            .collect();
        pending.sort_by(|a, b| {
            (a.registration_date, &a.id).cmp(&(b.registration_date, &b.id))
        });
        Ok(pending.into_iter().map(|r| r.id.clone()).collect())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn replace_otp(&self, record: &OtpVerification) -> Result<()> {
        let mut state = self.state.write().await;
        let email = record.email.as_deref();
        let contact = record.contact_number.as_deref();
        state.otps.retain(|_, otp| !otp.overlaps(email, contact));
        state.otps.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_otp(
        &self,
        email: Option<&str>,
        contact_number: Option<&str>,
    ) -> Result<Option<OtpVerification>> {
        let state = self.state.read().await;
        Ok(state
            .otps
            .values()
            .filter(|otp| otp.matches(email, contact_number))
            .max_by_key(|otp| otp.created_at)
            .cloned())
    }

    async fn save_otp(&self, record: &OtpVerification) -> Result<()> {
        self.state
            .write()
            .await
            .otps
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_otp(&self, id: &str) -> Result<()> {
        self.state.write().await.otps.remove(id);
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn record_payment(
        &self,
        transaction: &Transaction,
        registration: Option<&Registration>,
    ) -> Result<PaymentWrite> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .idempotency
            .get(&transaction.idempotency_key)
            .and_then(|id| state.transactions.get(id))
        {
            return Ok(PaymentWrite::Replayed(existing.clone()));
        }

        if state.transactions.contains_key(&transaction.transaction_id) {
            return Err(Error::conflict(format!(
                "Transaction {} is already recorded",
                transaction.transaction_id
            )));
        }

        if let Some(registration) = registration {
            let Some(slot) = state.registrations.get_mut(&registration.id) else {
                return Err(Error::not_found(format!(
                    "Registration {} not found",
                    registration.id
                )));
            };
            let serial = slot.serial_number;
            *slot = registration.clone();
            slot.serial_number = serial;
        }

        state.idempotency.insert(
            transaction.idempotency_key.clone(),
            transaction.transaction_id.clone(),
        );
        state
            .transactions
            .insert(transaction.transaction_id.clone(), transaction.clone());

        Ok(PaymentWrite::Recorded)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .idempotency
            .get(key)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn transactions_for(&self, registration_id: &str) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut found: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.registration_id.as_deref() == Some(registration_id))
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn create_message(&self, message: &ContactMessage) -> Result<()> {
        self.state
            .write()
            .await
            .messages
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<ContactMessage>> {
        Ok(self.state.read().await.messages.get(id).cloned())
    }

    async fn save_message(&self, message: &ContactMessage) -> Result<()> {
        let mut state = self.state.write().await;
        match state.messages.get_mut(&message.id) {
            Some(slot) => {
                *slot = message.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!("Message {} not found", message.id))),
        }
    }

    async fn list_messages(&self) -> Result<Vec<ContactMessage>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .values()
            .cloned()
            .collect())
    }
}
