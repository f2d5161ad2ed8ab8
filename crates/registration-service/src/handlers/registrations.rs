//! Public registration form endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use reunion_common::{Error, Registration};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{success, success_with_message, ApiError, Envelope},
    extract::{header, VERIFICATION_TOKEN_HEADER},
    services::steps::{self, StepOutcome, StepRequest},
    AppState,
};

fn parse_step(raw: &str) -> Result<u8, Error> {
    raw.trim()
        .parse::<u8>()
        .map_err(|_| Error::validation(format!("Invalid step: {}", raw)))
}

/// Save one step of the multi-step form
pub async fn save_step_handler(
    State(state): State<Arc<AppState>>,
    Path(step): Path<String>,
    Json(payload): Json<StepRequest>,
) -> Result<Json<Envelope<StepOutcome>>, ApiError> {
    let step = parse_step(&step)?;
    info!("Saving registration step {}", step);

    let outcome = steps::save_step(&state, step, &payload).await?;
    Ok(success_with_message(
        outcome,
        format!("Step {} saved successfully", step),
    ))
}

/// Look up a registration to resume the form
///
/// The caller proves control of the email with the token from OTP
/// verification, sent as `x-verification-token`.
pub async fn get_by_email_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Result<Json<Envelope<Registration>>, ApiError> {
    let token = header(&headers, VERIFICATION_TOKEN_HEADER);
    let registration = steps::get_registration_by_email(&state, &email, token).await?;
    Ok(success(registration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step() {
        assert_eq!(parse_step("3").unwrap(), 3);
        assert!(matches!(parse_step("three"), Err(Error::Validation(_))));
        assert!(matches!(parse_step("-1"), Err(Error::Validation(_))));
    }
}
