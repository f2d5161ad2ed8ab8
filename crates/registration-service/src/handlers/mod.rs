//! API request handlers
//!
//! Handlers unpack the request, call into `services` and wrap the result in
//! the response envelope.

pub mod admin;
pub mod contact;
pub mod otp;
pub mod payments;
pub mod registrations;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::{success, ApiError, Envelope},
    AppState,
};

/// Health check endpoint
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    state.store.ping().await?;

    Ok(success(json!({
        "status": "healthy",
        "service": "registration-service"
    })))
}
