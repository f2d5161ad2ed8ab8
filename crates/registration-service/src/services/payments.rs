//! Payments and transactions
//!
//! Every write goes through `TransactionStore::record_payment`, which stores
//! the transaction and the updated registration together under the
//! transaction's idempotency key. A retried request with the same key gets
//! the original transaction back and changes nothing.

use chrono::Utc;
use form_rules::sanitize_section;
use reunion_common::{
    AdminContext, Error, PaymentStatus, Registration, Result, Section, SectionKind, Transaction,
    TransactionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{notify::templates, services::serial, store::PaymentWrite, AppState};

const PAYMENT_HISTORY: &str = "paymentHistory";

/// Free-standing or registration-linked transaction
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default)]
    pub registration_id: Option<String>,

    pub amount: f64,

    #[serde(default)]
    pub status: Option<TransactionStatus>,

    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default)]
    pub is_anonymous: bool,

    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Completed payment against a registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: f64,

    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Body of the legacy `PUT /registrations/{id}` status update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentUpdate {
    pub payment_status: String,

    #[serde(default)]
    pub amount: Option<f64>,

    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,

    /// True when the idempotency key had already been used
    pub replayed: bool,
}

fn positive_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(Error::validation("Amount must be greater than 0"))
    }
}

fn financial_mut(registration: &mut Registration) -> &mut Section {
    registration
        .form_data_structured
        .financial
        .get_or_insert_with(Section::new)
}

fn set_payment_status(registration: &mut Registration, status: PaymentStatus) {
    registration.payment_status = status;
    financial_mut(registration).insert(
        "paymentStatus".to_string(),
        Value::String(status.as_str().to_string()),
    );
}

fn set_contribution(registration: &mut Registration, amount: f64) {
    financial_mut(registration).insert("contributionAmount".to_string(), Value::from(amount));
}

fn append_history(registration: &mut Registration, transaction: &Transaction) -> Result<()> {
    let entry = serde_json::to_value(transaction.history_entry())?;
    let history = financial_mut(registration)
        .entry(PAYMENT_HISTORY)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !history.is_array() {
        *history = Value::Array(Vec::new());
    }
    if let Value::Array(entries) = history {
        entries.push(entry);
    }
    Ok(())
}

/// Apply a completed payment to the registration's financial state
fn apply_completed(registration: &mut Registration, transaction: &Transaction) -> Result<()> {
    set_payment_status(registration, PaymentStatus::Completed);
    append_history(registration, transaction)?;
    registration.refresh_denormalized();
    registration.last_updated = Utc::now();
    Ok(())
}

async fn load_registration(state: &AppState, id: &str) -> Result<Registration> {
    state
        .store
        .get_registration(id)
        .await?
        .ok_or_else(|| Error::not_found("Registration not found"))
}

/// The key a request will be recorded under, when it can be known up front
fn request_key<'a>(idempotency_key: Option<&'a str>, transaction_id: Option<&'a str>) -> Option<&'a str> {
    fn present(key: Option<&str>) -> Option<&str> {
        key.map(str::trim).filter(|k| !k.is_empty())
    }
    present(idempotency_key).or_else(|| present(transaction_id))
}

/// Return an earlier transaction for a retried request. A key recorded
/// against one registration never replays for another.
async fn replay(
    state: &AppState,
    original: Transaction,
    requested: Option<&str>,
) -> Result<PaymentOutcome> {
    if let Some(requested) = requested {
        if original.registration_id.as_deref() != Some(requested) {
            return Err(Error::conflict(format!(
                "Transaction {} is already recorded for another registration",
                original.transaction_id
            )));
        }
    }

    info!(
        "Replaying transaction {} for idempotency key {}",
        original.transaction_id, original.idempotency_key
    );
    let registration = match original.registration_id.as_deref() {
        Some(id) => state.store.get_registration(id).await?,
        None => None,
    };
    Ok(PaymentOutcome {
        transaction: Some(original),
        registration,
        replayed: true,
    })
}

/// Replay an already-recorded request without touching anything else
async fn find_replay(
    state: &AppState,
    key: Option<&str>,
    registration_id: Option<&str>,
) -> Result<Option<PaymentOutcome>> {
    let Some(key) = key else {
        return Ok(None);
    };
    match state.store.find_by_idempotency_key(key).await? {
        Some(original) => replay(state, original, registration_id).await.map(Some),
        None => Ok(None),
    }
}

/// Write the transaction (and registration update) and run the side effects
/// of a completed payment.
async fn commit(
    state: &AppState,
    transaction: Transaction,
    registration: Option<Registration>,
    registration_changed: bool,
) -> Result<PaymentOutcome> {
    let update = registration.as_ref().filter(|_| registration_changed);
    if let PaymentWrite::Replayed(original) =
        state.store.record_payment(&transaction, update).await?
    {
        return replay(state, original, transaction.registration_id.as_deref()).await;
    }

    let mut registration = registration;
    if transaction.status == TransactionStatus::Completed {
        if let Some(registration) = registration.as_mut() {
            after_completed_payment(state, registration, &transaction).await;
        }
    }

    Ok(PaymentOutcome {
        transaction: Some(transaction),
        registration,
        replayed: false,
    })
}

async fn after_completed_payment(
    state: &AppState,
    registration: &mut Registration,
    transaction: &Transaction,
) {
    if registration.serial_number.is_none() {
        registration.serial_number =
            serial::assign_best_effort(&*state.store, &registration.id).await;
    }

    let content = templates::payment_receipt(&state.settings.event_name, registration, transaction);
    if let Err(e) = state
        .notifier
        .send_email(&registration.email, &content.subject, &content.text)
        .await
    {
        warn!(
            "Payment receipt for transaction {} failed: {}",
            transaction.transaction_id, e
        );
    }
}

/// Record a transaction, optionally linked to a registration
pub async fn transaction_register(
    state: &AppState,
    request: &TransactionRequest,
) -> Result<PaymentOutcome> {
    let amount = positive_amount(request.amount)?;
    let key = request_key(
        request.idempotency_key.as_deref(),
        request.transaction_id.as_deref(),
    );
    let registration_id = request
        .registration_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(outcome) = find_replay(state, key, registration_id).await? {
        return Ok(outcome);
    }

    let mut registration = match registration_id {
        Some(id) => Some(load_registration(state, id).await?),
        None => None,
    };

    let status = request.status.unwrap_or(TransactionStatus::Completed);
    let purpose = request
        .purpose
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "contribution".to_string());

    let mut transaction = Transaction::new(
        request.transaction_id.clone(),
        registration.as_ref().map(|r| r.id.clone()),
        amount,
        status,
        purpose,
        request.idempotency_key.clone(),
    );
    transaction.is_anonymous = request.is_anonymous;
    transaction.payment_method = request.payment_method.clone();

    let changed = match registration.as_mut() {
        Some(registration) if status == TransactionStatus::Completed => {
            apply_completed(registration, &transaction)?;
            true
        }
        _ => false,
    };

    let outcome = commit(state, transaction, registration, changed).await?;
    if let Some(transaction) = &outcome.transaction {
        info!(
            "Transaction {} registered ({:?}, {})",
            transaction.transaction_id, transaction.status, transaction.amount
        );
    }
    Ok(outcome)
}

/// Completed payment that sets the registration's contribution
pub async fn process_payment(
    state: &AppState,
    registration_id: &str,
    request: &PaymentRequest,
) -> Result<PaymentOutcome> {
    pay(state, registration_id, request, "registration", |_, amount| amount).await
}

/// Completed payment that adds to the registration's contribution
pub async fn add_more_amount(
    state: &AppState,
    registration_id: &str,
    request: &PaymentRequest,
) -> Result<PaymentOutcome> {
    pay(
        state,
        registration_id,
        request,
        "additional-contribution",
        |current, amount| current + amount,
    )
    .await
}

async fn pay(
    state: &AppState,
    registration_id: &str,
    request: &PaymentRequest,
    purpose: &str,
    contribution: impl Fn(f64, f64) -> f64,
) -> Result<PaymentOutcome> {
    let amount = positive_amount(request.amount)?;
    let key = request_key(
        request.idempotency_key.as_deref(),
        request.transaction_id.as_deref(),
    );
    if let Some(outcome) = find_replay(state, key, Some(registration_id)).await? {
        return Ok(outcome);
    }

    let mut registration = load_registration(state, registration_id).await?;

    let mut transaction = Transaction::new(
        request.transaction_id.clone(),
        Some(registration.id.clone()),
        amount,
        TransactionStatus::Completed,
        purpose,
        request.idempotency_key.clone(),
    );
    transaction.payment_method = request.payment_method.clone();

    let total = contribution(registration.contribution_amount(), amount);
    set_contribution(&mut registration, total);
    apply_completed(&mut registration, &transaction)?;

    let outcome = commit(state, transaction, Some(registration), true).await?;
    if !outcome.replayed {
        info!(
            "Payment of {} recorded for registration {} ({})",
            amount, registration_id, purpose
        );
    }
    Ok(outcome)
}

/// Set a registration's payment status directly
///
/// A transaction is recorded only when the caller supplies a transaction id.
pub async fn update_registration_payment(
    state: &AppState,
    registration_id: &str,
    update: &LegacyPaymentUpdate,
) -> Result<PaymentOutcome> {
    let status: PaymentStatus = update.payment_status.parse()?;
    if let Some(amount) = update.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(Error::validation("Amount cannot be negative"));
        }
    }

    let transaction_id = update
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let key = transaction_id.and(request_key(update.idempotency_key.as_deref(), transaction_id));
    if let Some(outcome) = find_replay(state, key, Some(registration_id)).await? {
        return Ok(outcome);
    }

    let mut registration = load_registration(state, registration_id).await?;

    set_payment_status(&mut registration, status);
    if let Some(amount) = update.amount {
        set_contribution(&mut registration, amount);
    }
    registration.form_data_structured.financial = sanitize_section(
        SectionKind::Financial,
        registration.form_data_structured.financial.as_ref(),
    );

    let Some(transaction_id) = transaction_id else {
        registration.refresh_denormalized();
        registration.last_updated = Utc::now();
        state.store.save_registration(&registration).await?;
        info!(
            "Payment status of registration {} set to {}",
            registration.id, status
        );
        if status == PaymentStatus::Completed && registration.serial_number.is_none() {
            registration.serial_number =
                serial::assign_best_effort(&*state.store, &registration.id).await;
        }
        return Ok(PaymentOutcome {
            transaction: None,
            registration: Some(registration),
            replayed: false,
        });
    };

    let transaction_status = match status {
        PaymentStatus::Completed => TransactionStatus::Completed,
        PaymentStatus::Failed => TransactionStatus::Failed,
        PaymentStatus::NotStarted
        | PaymentStatus::Pending
        | PaymentStatus::FinancialDifficulty
        | PaymentStatus::ForeignTransaction => TransactionStatus::Pending,
    };
    let mut transaction = Transaction::new(
        Some(transaction_id.to_string()),
        Some(registration.id.clone()),
        update.amount.unwrap_or_else(|| registration.contribution_amount()),
        transaction_status,
        "registration",
        update.idempotency_key.clone(),
    );
    transaction.payment_method = update.payment_method.clone();

    if transaction_status == TransactionStatus::Completed {
        append_history(&mut registration, &transaction)?;
    }
    registration.refresh_denormalized();
    registration.last_updated = Utc::now();

    commit(state, transaction, Some(registration), true).await
}

/// Transactions of one registration, for admins who can see its school
pub async fn list_transactions(
    state: &AppState,
    ctx: &AdminContext,
    registration_id: &str,
) -> Result<Vec<Transaction>> {
    let registration = load_registration(state, registration_id).await?;
    if !ctx.can_view_school(&registration.school) {
        return Err(Error::Forbidden(
            "Registration belongs to a school outside your scope".to_string(),
        ));
    }
    state.store.transactions_for(&registration.id).await
}
