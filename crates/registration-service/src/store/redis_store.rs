//! Redis storage for registrations, OTP records, transactions and contact
//! messages
//!
//! Data model:
//! - registration:{id} → JSON document
//! - registration:email:{email}, registration:contact:{number} → Sets of ids
//! - registrations:all → Set of all registration ids
//! - registrations:by_serial → Sorted set (score=serial, member=id); the only
//!   place a registration's serial is stored
//! - serial:{n} → id holding serial n (claimed with SET NX)
//! - otp:{id} → JSON document, indexed by otp:email:{email} / otp:contact:{number}
//! - transaction:{id} → JSON document
//! - transactions:registration:{id} → Set of transaction ids
//! - transaction:idem:{key} → transaction id (claimed with SET NX)
//! - contact:{id} → JSON document, contacts:all → Set of ids

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use reunion_common::{
    normalize_email, ContactMessage, Error, OtpVerification, Registration, Result, Transaction,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::{
    CascadeReport, ContactStore, OtpStore, PaymentWrite, RegistrationStore, SerialStore,
    TransactionStore,
};

const ALL_REGISTRATIONS: &str = "registrations:all";
const BY_SERIAL: &str = "registrations:by_serial";
const ALL_CONTACTS: &str = "contacts:all";

/// Inserts a registration unless its email index is already populated.
/// KEYS: email index, document, all-registrations set, contact index.
/// ARGV: document JSON, id, contact number.
const CREATE_REGISTRATION: &str = r#"
if redis.call('SCARD', KEYS[1]) > 0 then
  return 0
end
redis.call('SET', KEYS[2], ARGV[1])
redis.call('SADD', KEYS[1], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[2])
if ARGV[3] ~= '' then
  redis.call('SADD', KEYS[4], ARGV[2])
end
return 1
"#;

/// Moves a registration to a new serial. Returns -1 when the registration is
/// missing and 0 when the serial is held by someone else.
/// KEYS: document, serial key, serial index. ARGV: id, serial.
const CLAIM_SERIAL: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if not redis.call('SET', KEYS[2], ARGV[1], 'NX') then
  return 0
end
local previous = redis.call('ZSCORE', KEYS[3], ARGV[1])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[1])
if previous and tonumber(previous) ~= tonumber(ARGV[2]) then
  redis.call('DEL', 'serial:' .. tostring(tonumber(previous)))
end
return 1
"#;

/// Writes a transaction under a fresh idempotency key and transaction id.
/// Returns {1, original id} for a used key, {2, ''} for a used transaction id
/// and {3, ''} for a missing registration.
/// KEYS: idempotency key, transaction, registration's transaction set,
/// registration document.
/// ARGV: transaction id, transaction JSON, registration JSON or '', '1' to link.
const RECORD_PAYMENT: &str = r#"
local original = redis.call('GET', KEYS[1])
if original then
  return {1, original}
end
if redis.call('EXISTS', KEYS[2]) == 1 then
  return {2, ''}
end
if ARGV[3] ~= '' and redis.call('EXISTS', KEYS[4]) == 0 then
  return {3, ''}
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
if ARGV[4] == '1' then
  redis.call('SADD', KEYS[3], ARGV[1])
end
if ARGV[3] ~= '' then
  redis.call('SET', KEYS[4], ARGV[3])
end
return {0, ''}
"#;

fn registration_key(id: &str) -> String {
    format!("registration:{}", id)
}

fn email_index(email: &str) -> String {
    format!("registration:email:{}", normalize_email(email))
}

fn contact_index(contact_number: &str) -> String {
    format!("registration:contact:{}", contact_number)
}

fn serial_key(serial: u64) -> String {
    format!("serial:{}", serial)
}

fn otp_key(id: &str) -> String {
    format!("otp:{}", id)
}

fn otp_email_index(email: &str) -> String {
    format!("otp:email:{}", email)
}

fn otp_contact_index(contact_number: &str) -> String {
    format!("otp:contact:{}", contact_number)
}

fn transaction_key(id: &str) -> String {
    format!("transaction:{}", id)
}

fn registration_transactions(registration_id: &str) -> String {
    format!("transactions:registration:{}", registration_id)
}

fn idempotency_key(key: &str) -> String {
    format!("transaction:idem:{}", key)
}

fn contact_message_key(id: &str) -> String {
    format!("contact:{}", id)
}

fn storage_err(err: redis::RedisError) -> Error {
    Error::Storage(err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

async fn load_one<T: DeserializeOwned>(conn: &mut ConnectionManager, key: &str) -> Result<Option<T>> {
    let raw: Option<String> = conn.get(key).await.map_err(storage_err)?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

async fn load_many<T: DeserializeOwned>(
    conn: &mut ConnectionManager,
    keys: &[String],
) -> Result<Vec<T>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<Option<String>> = redis::cmd("MGET")
        .arg(keys)
        .query_async(conn)
        .await
        .map_err(storage_err)?;

    raw.into_iter()
        .flatten()
        .map(|json| serde_json::from_str(&json).map_err(Error::from))
        .collect()
}

/// Document as stored: the serial lives in the serial index instead
fn document(registration: &Registration) -> Result<String> {
    let mut stored = registration.clone();
    stored.serial_number = None;
    to_json(&stored)
}

/// Fill in serials from the serial index
async fn with_serials(
    conn: &mut ConnectionManager,
    mut registrations: Vec<Registration>,
) -> Result<Vec<Registration>> {
    if registrations.is_empty() {
        return Ok(registrations);
    }

    let mut pipe = redis::pipe();
    for registration in &registrations {
        pipe.zscore(BY_SERIAL, &registration.id);
    }
    let scores: Vec<Option<f64>> = pipe.query_async(conn).await.map_err(storage_err)?;

    for (registration, score) in registrations.iter_mut().zip(scores) {
        registration.serial_number = score.map(|s| s as u64);
    }
    Ok(registrations)
}

fn newest(registrations: Vec<Registration>) -> Option<Registration> {
    registrations.into_iter().max_by(|a, b| {
        (a.registration_date, a.last_updated).cmp(&(b.registration_date, b.last_updated))
    })
}

/// Redis-backed store
pub struct RedisStore {
    conn: ConnectionManager,
    create_script: Script,
    claim_serial_script: Script,
    payment_script: Script,
}

impl RedisStore {
    /// Create a new storage client
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Successfully connected to Redis");

        Ok(Self {
            conn,
            create_script: Script::new(CREATE_REGISTRATION),
            claim_serial_script: Script::new(CLAIM_SERIAL),
            payment_script: Script::new(RECORD_PAYMENT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn registrations_in(&self, index: &str) -> Result<Vec<Registration>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(index).await.map_err(storage_err)?;
        let keys: Vec<String> = ids.iter().map(|id| registration_key(id)).collect();
        let registrations = load_many(&mut conn, &keys).await?;
        with_serials(&mut conn, registrations).await
    }

    /// OTP records sharing either identifier
    async fn overlapping_otps(
        &self,
        conn: &mut ConnectionManager,
        email: Option<&str>,
        contact_number: Option<&str>,
    ) -> Result<Vec<OtpVerification>> {
        let mut indexes = Vec::new();
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            indexes.push(otp_email_index(email));
        }
        if let Some(contact) = contact_number.filter(|c| !c.is_empty()) {
            indexes.push(otp_contact_index(contact));
        }
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = redis::cmd("SUNION")
            .arg(&indexes)
            .query_async(&mut *conn)
            .await
            .map_err(storage_err)?;
        let keys: Vec<String> = ids.iter().map(|id| otp_key(id)).collect();
        load_many(conn, &keys).await
    }
}

/// Queue removal of an OTP record and its index entries
fn queue_otp_delete(pipe: &mut redis::Pipeline, otp: &OtpVerification) {
    pipe.del(otp_key(&otp.id)).ignore();
    if let Some(email) = &otp.email {
        pipe.srem(otp_email_index(email), &otp.id).ignore();
    }
    if let Some(contact) = &otp.contact_number {
        pipe.srem(otp_contact_index(contact), &otp.id).ignore();
    }
}

#[async_trait]
impl RegistrationStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn create_registration(&self, registration: &Registration) -> Result<()> {
        let mut conn = self.conn();
        let created: i32 = self
            .create_script
            .key(email_index(&registration.email))
            .key(registration_key(&registration.id))
            .key(ALL_REGISTRATIONS)
            .key(contact_index(&registration.contact_number))
            .arg(document(registration)?)
            .arg(&registration.id)
            .arg(&registration.contact_number)
            .invoke_async(&mut conn)
            .await
            .map_err(storage_err)?;

        if created == 0 {
            debug!("Registration already exists for {}", registration.email);
            return Err(Error::conflict(format!(
                "A registration already exists for {}",
                registration.email
            )));
        }

        info!("Created registration {}", registration.id);
        Ok(())
    }

    async fn get_registration(&self, id: &str) -> Result<Option<Registration>> {
        let mut conn = self.conn();
        let found: Option<Registration> = load_one(&mut conn, &registration_key(id)).await?;
        let Some(registration) = found else {
            return Ok(None);
        };
        Ok(with_serials(&mut conn, vec![registration]).await?.pop())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registration>> {
        Ok(newest(self.registrations_in(&email_index(email)).await?))
    }

    async fn find_by_contact(&self, contact_number: &str) -> Result<Vec<Registration>> {
        self.registrations_in(&contact_index(contact_number)).await
    }

    async fn save_registration(&self, registration: &Registration) -> Result<()> {
        let mut conn = self.conn();
        let key = registration_key(&registration.id);
        let Some(previous): Option<Registration> = load_one(&mut conn, &key).await? else {
            return Err(Error::not_found(format!(
                "Registration {} not found",
                registration.id
            )));
        };

        let mut pipe = redis::pipe();
        pipe.atomic().set(&key, document(registration)?).ignore();

        if previous.contact_number != registration.contact_number {
            if !previous.contact_number.is_empty() {
                pipe.srem(contact_index(&previous.contact_number), &registration.id)
                    .ignore();
            }
            if !registration.contact_number.is_empty() {
                pipe.sadd(contact_index(&registration.contact_number), &registration.id)
                    .ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await.map_err(storage_err)?;
        Ok(())
    }

    async fn list_registrations(&self) -> Result<Vec<Registration>> {
        self.registrations_in(ALL_REGISTRATIONS).await
    }

    async fn delete_registration_cascade(&self, id: &str) -> Result<Option<CascadeReport>> {
        let Some(registration) = self.get_registration(id).await? else {
            return Ok(None);
        };
        let mut conn = self.conn();

        let contact = Some(registration.contact_number.as_str()).filter(|c| !c.is_empty());
        let otps = self
            .overlapping_otps(&mut conn, Some(&registration.email), contact)
            .await?;

        let transaction_ids: Vec<String> = conn
            .smembers(registration_transactions(id))
            .await
            .map_err(storage_err)?;
        let transaction_keys: Vec<String> =
            transaction_ids.iter().map(|t| transaction_key(t)).collect();
        let transactions: Vec<Transaction> = load_many(&mut conn, &transaction_keys).await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(registration_key(id))
            .ignore()
            .srem(email_index(&registration.email), id)
            .ignore()
            .srem(ALL_REGISTRATIONS, id)
            .ignore()
            .zrem(BY_SERIAL, id)
            .ignore();
        if let Some(contact) = contact {
            pipe.srem(contact_index(contact), id).ignore();
        }
        if let Some(serial) = registration.serial_number {
            pipe.del(serial_key(serial)).ignore();
        }
        for otp in &otps {
            queue_otp_delete(&mut pipe, otp);
        }
        for transaction in &transactions {
            pipe.del(transaction_key(&transaction.transaction_id))
                .ignore()
                .del(idempotency_key(&transaction.idempotency_key))
                .ignore();
        }
        pipe.del(registration_transactions(id)).ignore();

        let _: () = pipe.query_async(&mut conn).await.map_err(storage_err)?;

        info!(
            "Cascade deleted registration {} ({} OTP, {} transactions)",
            id,
            otps.len(),
            transactions.len()
        );

        Ok(Some(CascadeReport {
            registration_id: id.to_string(),
            otp_records_deleted: otps.len(),
            transactions_deleted: transactions.len(),
        }))
    }
}

#[async_trait]
impl SerialStore for RedisStore {
    async fn current_serial(&self, id: &str) -> Result<Option<u64>> {
        self.get_registration(id)
            .await?
            .map(|r| r.serial_number)
            .ok_or_else(|| Error::not_found(format!("Registration {} not found", id)))
    }

    async fn max_serial(&self) -> Result<u64> {
        let mut conn = self.conn();
        let top: Vec<(String, f64)> = conn
            .zrevrange_withscores(BY_SERIAL, 0, 0)
            .await
            .map_err(storage_err)?;
        Ok(top.first().map(|(_, score)| *score as u64).unwrap_or(0))
    }

    async fn claim_serial(&self, id: &str, serial: u64) -> Result<bool> {
        let mut conn = self.conn();
        let claimed: i32 = self
            .claim_serial_script
            .key(registration_key(id))
            .key(serial_key(serial))
            .key(BY_SERIAL)
            .arg(id)
            .arg(serial)
            .invoke_async(&mut conn)
            .await
            .map_err(storage_err)?;

        match claimed {
            -1 => Err(Error::not_found(format!("Registration {} not found", id))),
            0 => {
                debug!("Serial {} already taken", serial);
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    async fn unserialized_ids(&self) -> Result<Vec<String>> {
        let mut pending: Vec<Registration> = self
            .list_registrations()
            .await?
            .into_iter()
            .filter(|r| r.serial_number.is_none())
            .collect();
        pending.sort_by(|a, b| (a.registration_date, &a.id).cmp(&(b.registration_date, &b.id)));
        Ok(pending.into_iter().map(|r| r.id).collect())
    }
}

#[async_trait]
impl OtpStore for RedisStore {
    async fn replace_otp(&self, record: &OtpVerification) -> Result<()> {
        let mut conn = self.conn();
        let previous = self
            .overlapping_otps(
                &mut conn,
                record.email.as_deref(),
                record.contact_number.as_deref(),
            )
            .await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for otp in &previous {
            queue_otp_delete(&mut pipe, otp);
        }
        pipe.set(otp_key(&record.id), to_json(record)?).ignore();
        if let Some(email) = &record.email {
            pipe.sadd(otp_email_index(email), &record.id).ignore();
        }
        if let Some(contact) = &record.contact_number {
            pipe.sadd(otp_contact_index(contact), &record.id).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(storage_err)?;

        debug!("Replaced {} OTP record(s)", previous.len());
        Ok(())
    }

    async fn find_otp(
        &self,
        email: Option<&str>,
        contact_number: Option<&str>,
    ) -> Result<Option<OtpVerification>> {
        let mut conn = self.conn();
        let ids: Vec<String> = match (email, contact_number) {
            (Some(email), Some(contact)) => conn
                .sinter(vec![otp_email_index(email), otp_contact_index(contact)])
                .await
                .map_err(storage_err)?,
            (Some(email), None) => conn
                .smembers(otp_email_index(email))
                .await
                .map_err(storage_err)?,
            (None, Some(contact)) => conn
                .smembers(otp_contact_index(contact))
                .await
                .map_err(storage_err)?,
            (None, None) => return Ok(None),
        };

        let keys: Vec<String> = ids.iter().map(|id| otp_key(id)).collect();
        let records: Vec<OtpVerification> = load_many(&mut conn, &keys).await?;
        Ok(records
            .into_iter()
            .filter(|otp| otp.matches(email, contact_number))
            .max_by_key(|otp| otp.created_at))
    }

    async fn save_otp(&self, record: &OtpVerification) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn
            .set(otp_key(&record.id), to_json(record)?)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_otp(&self, id: &str) -> Result<()> {
        let mut conn = self.conn();
        let Some(record): Option<OtpVerification> = load_one(&mut conn, &otp_key(id)).await? else {
            return Ok(());
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        queue_otp_delete(&mut pipe, &record);
        let _: () = pipe.query_async(&mut conn).await.map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RedisStore {
    async fn record_payment(
        &self,
        transaction: &Transaction,
        registration: Option<&Registration>,
    ) -> Result<PaymentWrite> {
        let mut conn = self.conn();
        let linked = transaction.registration_id.as_deref();
        let document_id = registration.map(|r| r.id.as_str()).or(linked).unwrap_or_default();
        let registration_json = match registration {
            Some(registration) => document(registration)?,
            None => String::new(),
        };

        let (outcome, original): (i32, String) = self
            .payment_script
            .key(idempotency_key(&transaction.idempotency_key))
            .key(transaction_key(&transaction.transaction_id))
            .key(registration_transactions(linked.unwrap_or_default()))
            .key(registration_key(document_id))
            .arg(&transaction.transaction_id)
            .arg(to_json(transaction)?)
            .arg(registration_json)
            .arg(if linked.is_some() { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await
            .map_err(storage_err)?;

        match outcome {
            1 => match load_one(&mut conn, &transaction_key(&original)).await? {
                Some(original) => Ok(PaymentWrite::Replayed(original)),
                None => Err(Error::conflict(format!(
                    "Idempotency key {} belongs to a removed transaction",
                    transaction.idempotency_key
                ))),
            },
            2 => Err(Error::conflict(format!(
                "Transaction {} is already recorded",
                transaction.transaction_id
            ))),
            3 => Err(Error::not_found(format!(
                "Registration {} not found",
                document_id
            ))),
            _ => {
                info!(
                    "Recorded transaction {} ({})",
                    transaction.transaction_id, transaction.amount
                );
                Ok(PaymentWrite::Recorded)
            }
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        let mut conn = self.conn();
        let id: Option<String> = conn.get(idempotency_key(key)).await.map_err(storage_err)?;
        match id {
            Some(id) => load_one(&mut conn, &transaction_key(&id)).await,
            None => Ok(None),
        }
    }

    async fn transactions_for(&self, registration_id: &str) -> Result<Vec<Transaction>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers(registration_transactions(registration_id))
            .await
            .map_err(storage_err)?;
        let keys: Vec<String> = ids.iter().map(|id| transaction_key(id)).collect();
        let mut transactions: Vec<Transaction> = load_many(&mut conn, &keys).await?;
        transactions.sort_by_key(|t| t.created_at);
        Ok(transactions)
    }
}

#[async_trait]
impl ContactStore for RedisStore {
    async fn create_message(&self, message: &ContactMessage) -> Result<()> {
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(contact_message_key(&message.id), to_json(message)?)
            .ignore()
            .sadd(ALL_CONTACTS, &message.id)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(storage_err)?;
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<ContactMessage>> {
        load_one(&mut self.conn(), &contact_message_key(id)).await
    }

    async fn save_message(&self, message: &ContactMessage) -> Result<()> {
        let mut conn = self.conn();
        let key = contact_message_key(&message.id);
        let exists: bool = conn.exists(&key).await.map_err(storage_err)?;
        if !exists {
            return Err(Error::not_found(format!("Message {} not found", message.id)));
        }
        let _: () = conn.set(&key, to_json(message)?).await.map_err(storage_err)?;
        Ok(())
    }

    async fn list_messages(&self) -> Result<Vec<ContactMessage>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(ALL_CONTACTS).await.map_err(storage_err)?;
        let keys: Vec<String> = ids.iter().map(|id| contact_message_key(id)).collect();
        load_many(&mut conn, &keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reunion_common::TransactionStatus;

    async fn get_test_store() -> RedisStore {
        RedisStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis")
    }

    fn unique_email() -> String {
        format!("{}@test.local", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_create_rejects_duplicate_email() {
        let store = get_test_store().await;
        let email = unique_email();

        let first = Registration::new(&email, "9000");
        store.create_registration(&first).await.unwrap();

        let err = store
            .create_registration(&Registration::new(&email, "9001"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let found = store.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        store.delete_registration_cascade(&first.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_cascade_removes_otp_and_transactions() {
        let store = get_test_store().await;
        let email = unique_email();
        let registration = Registration::new(&email, "");
        store.create_registration(&registration).await.unwrap();

        store
            .replace_otp(&OtpVerification::new(Some(email.clone()), None, "123456".into()))
            .await
            .unwrap();
        let txn = Transaction::new(
            None,
            Some(registration.id.clone()),
            50.0,
            TransactionStatus::Completed,
            "registration",
            None,
        );
        store.record_payment(&txn, Some(&registration)).await.unwrap();

        let report = store
            .delete_registration_cascade(&registration.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.otp_records_deleted, 1);
        assert_eq!(report.transactions_deleted, 1);
        assert!(store.find_otp(Some(&email), None).await.unwrap().is_none());
        assert!(store.get_registration(&registration.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_stale_save_keeps_claimed_serial() {
        let store = get_test_store().await;
        let registration = Registration::new(&unique_email(), "");
        store.create_registration(&registration).await.unwrap();

        // Loaded before the claim, saved after it
        let mut stale = store.get_registration(&registration.id).await.unwrap().unwrap();
        let serial = 1_000_000 + rand::random::<u32>() as u64;
        assert!(store.claim_serial(&registration.id, serial).await.unwrap());
        stale.current_step = 3;
        store.save_registration(&stale).await.unwrap();

        let saved = store.get_registration(&registration.id).await.unwrap().unwrap();
        assert_eq!(saved.current_step, 3);
        assert_eq!(saved.serial_number, Some(serial));
        assert_eq!(store.current_serial(&registration.id).await.unwrap(), Some(serial));

        // Deleting releases the number
        store.delete_registration_cascade(&registration.id).await.unwrap();
        let next = Registration::new(&unique_email(), "");
        store.create_registration(&next).await.unwrap();
        assert!(store.claim_serial(&next.id, serial).await.unwrap());

        store.delete_registration_cascade(&next.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_reused_transaction_id_is_rejected() {
        let store = get_test_store().await;
        let registration = Registration::new(&unique_email(), "");
        store.create_registration(&registration).await.unwrap();
        let transaction_id = format!("TXN-{}", uuid::Uuid::new_v4());

        let first = Transaction::new(
            Some(transaction_id.clone()),
            Some(registration.id.clone()),
            1500.0,
            TransactionStatus::Completed,
            "registration",
            Some(format!("{}-a", transaction_id)),
        );
        store.record_payment(&first, Some(&registration)).await.unwrap();

        let reused = Transaction::new(
            Some(transaction_id.clone()),
            Some(registration.id.clone()),
            10.0,
            TransactionStatus::Completed,
            "registration",
            Some(format!("{}-b", transaction_id)),
        );
        let err = store.record_payment(&reused, None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let kept = store.transactions_for(&registration.id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].amount, 1500.0);

        store.delete_registration_cascade(&registration.id).await.unwrap();
    }
}
