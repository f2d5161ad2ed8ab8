//! Payment and transaction endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{success_with_message, ApiError, Envelope},
    services::payments::{
        self, LegacyPaymentUpdate, PaymentOutcome, PaymentRequest, TransactionRequest,
    },
    AppState,
};

fn message(outcome: &PaymentOutcome, recorded: &str) -> String {
    if outcome.replayed {
        "Payment already recorded".to_string()
    } else {
        recorded.to_string()
    }
}

/// Record a completed payment for a registration
pub async fn process_payment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<Envelope<PaymentOutcome>>, ApiError> {
    info!("Processing payment for registration: {}", id);

    let outcome = payments::process_payment(&state, &id, &payload).await?;
    let text = message(&outcome, "Payment processed successfully");
    Ok(success_with_message(outcome, text))
}

/// Record an additional contribution
pub async fn add_amount_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<Envelope<PaymentOutcome>>, ApiError> {
    info!("Adding contribution for registration: {}", id);

    let outcome = payments::add_more_amount(&state, &id, &payload).await?;
    let text = message(&outcome, "Additional amount added successfully");
    Ok(success_with_message(outcome, text))
}

/// Legacy payment status update
pub async fn update_payment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<LegacyPaymentUpdate>,
) -> Result<Json<Envelope<PaymentOutcome>>, ApiError> {
    info!(
        "Updating payment status of registration {} to {}",
        id, payload.payment_status
    );

    let outcome = payments::update_registration_payment(&state, &id, &payload).await?;
    let text = message(&outcome, "Payment status updated successfully");
    Ok(success_with_message(outcome, text))
}

/// Record a transaction, optionally linked to a registration
pub async fn register_transaction_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<Envelope<PaymentOutcome>>, ApiError> {
    let outcome = payments::transaction_register(&state, &payload).await?;
    let text = message(&outcome, "Transaction recorded successfully");
    Ok(success_with_message(outcome, text))
}
