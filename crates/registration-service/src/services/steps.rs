//! Multi-step form saves
//!
//! Step 1 creates the registration (after OTP verification); every later step
//! merges its payload into the stored form field by field. Both the incoming
//! payload and the merged result are sanitized.

use chrono::Utc;
use form_rules::{merge_forms, sanitize_form};
use reunion_common::{
    normalize_email, Error, PaymentStatus, Registration, Result, SectionKind, StructuredForm,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{notify::templates, services::serial, AppState};

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 8;

/// Financial keys payment processing owns once a payment has completed
const LOCKED_AFTER_PAYMENT: [&str; 2] = ["paymentStatus", "contributionAmount"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    #[serde(default)]
    pub form_data_structured: Option<StructuredForm>,

    #[serde(default)]
    pub verification_token: Option<String>,

    #[serde(default)]
    pub form_submission_complete: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub registration_id: String,
    pub current_step: u8,
    pub is_complete: bool,
    pub serial_number: Option<u64>,
}

impl From<&Registration> for StepOutcome {
    fn from(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id.clone(),
            current_step: registration.current_step,
            is_complete: registration.form_submission_complete,
            serial_number: registration.serial_number,
        }
    }
}

/// Drop financial values a client may not set.
///
/// Completed and failed statuses only come from payment processing, and a
/// completed payment's status and amount cannot be edited from the form.
fn restrict_financial(form: &mut StructuredForm, payment_completed: bool) -> Result<()> {
    let Some(financial) = form.financial.as_mut() else {
        return Ok(());
    };

    if payment_completed {
        for key in LOCKED_AFTER_PAYMENT {
            financial.remove(key);
        }
        return Ok(());
    }

    let status = match financial.get("paymentStatus") {
        Some(Value::String(raw)) => Some(raw.parse::<PaymentStatus>()?),
        _ => None,
    };
    if let Some(status) = status.filter(|s| !s.is_client_selectable()) {
        warn!("Ignoring client-supplied payment status {}", status);
        financial.remove("paymentStatus");
    }

    Ok(())
}

fn validate(step: u8, request: &StepRequest) -> Result<(&StructuredForm, String)> {
    if !(FIRST_STEP..=LAST_STEP).contains(&step) {
        return Err(Error::validation(format!(
            "Step must be between {} and {}",
            FIRST_STEP, LAST_STEP
        )));
    }

    let form = request
        .form_data_structured
        .as_ref()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| Error::validation("formDataStructured is required"))?;

    let email = form
        .text(SectionKind::PersonalInfo, "email")
        .map(normalize_email)
        .ok_or_else(|| Error::validation("personalInfo.email is required"))?;

    if form
        .number(SectionKind::Financial, "contributionAmount")
        .is_some_and(|amount| amount < 0.0)
    {
        return Err(Error::validation("Contribution amount cannot be negative"));
    }

    Ok((form, email))
}

/// Save one step of the registration form
pub async fn save_step(state: &AppState, step: u8, request: &StepRequest) -> Result<StepOutcome> {
    let (form, email) = validate(step, request)?;
    let existing = state.store.find_by_email(&email).await?;

    let mut incoming = form.clone();
    let payment_completed = existing
        .as_ref()
        .is_some_and(|r| r.payment_status == PaymentStatus::Completed);
    restrict_financial(&mut incoming, payment_completed)?;
    let incoming = sanitize_form(&incoming);

    match existing {
        None if step == FIRST_STEP => create(state, &email, incoming, request).await,
        None => Err(Error::validation(
            "Registration not found. Registration must start at step 1",
        )),
        Some(registration) => update(state, registration, step, incoming, request).await,
    }
}

async fn create(
    state: &AppState,
    email: &str,
    incoming: StructuredForm,
    request: &StepRequest,
) -> Result<StepOutcome> {
    let contact_number = incoming
        .text(SectionKind::PersonalInfo, "contactNumber")
        .map(str::to_string)
        .ok_or_else(|| Error::validation("personalInfo.contactNumber is required"))?;

    let otp = state
        .store
        .find_otp(Some(email), Some(&contact_number))
        .await?
        .filter(|record| record.verified)
        .ok_or_else(|| Error::Unauthorized("OTP verification required".to_string()))?;

    if let Some(token) = request.verification_token.as_deref() {
        if otp.verification_token.as_deref() != Some(token) {
            return Err(Error::Unauthorized(
                "Invalid verification token".to_string(),
            ));
        }
    }

    let mut registration = Registration::new(email, &contact_number);
    // Merging into an empty form strips server-owned keys
    registration.form_data_structured = merge_forms(&StructuredForm::default(), &incoming);
    registration.refresh_denormalized();
    registration.email_verified = true;
    registration.is_attending = false;
    registration.will_contribute = false;
    registration.current_step = FIRST_STEP;
    registration.highest_step_reached = FIRST_STEP;

    state.store.create_registration(&registration).await?;
    info!("Created registration {} for {}", registration.id, email);

    registration.serial_number =
        serial::assign_best_effort(&*state.store, &registration.id).await;

    Ok(StepOutcome::from(&registration))
}

async fn update(
    state: &AppState,
    mut registration: Registration,
    step: u8,
    incoming: StructuredForm,
    request: &StepRequest,
) -> Result<StepOutcome> {
    let payment_completed = registration.payment_status == PaymentStatus::Completed;

    let merged = merge_forms(&registration.form_data_structured, &incoming);
    registration.form_data_structured = sanitize_form(&merged);
    registration.refresh_denormalized();
    if payment_completed {
        registration.payment_status = PaymentStatus::Completed;
    }

    registration.current_step = step;
    registration.highest_step_reached = registration.highest_step_reached.max(step);
    registration.last_updated = Utc::now();

    let completes = step >= registration.final_step()
        && request.form_submission_complete == Some(true)
        && !registration.form_submission_complete;
    if completes {
        registration.form_submission_complete = true;
    }

    state.store.save_registration(&registration).await?;
    debug!("Saved step {} for registration {}", step, registration.id);

    if completes {
        info!("Registration {} completed", registration.id);
        if registration.serial_number.is_none() {
            registration.serial_number =
                serial::assign_best_effort(&*state.store, &registration.id).await;
        }
        send_confirmation(state, &registration).await;
    }

    Ok(StepOutcome::from(&registration))
}

async fn send_confirmation(state: &AppState, registration: &Registration) {
    let content = templates::registration_confirmation(&state.settings.event_name, registration);
    if let Err(e) = state
        .notifier
        .send_email(&registration.email, &content.subject, &content.text)
        .await
    {
        warn!(
            "Confirmation email for registration {} failed: {}",
            registration.id, e
        );
    }
}

/// Stored registration for the public resume flow
///
/// Requires the token issued when the email's OTP was verified.
pub async fn get_registration_by_email(
    state: &AppState,
    email: &str,
    token: Option<&str>,
) -> Result<Registration> {
    let email = normalize_email(email);
    let token = token
        .ok_or_else(|| Error::Unauthorized("Verification token required".to_string()))?;

    let verified = state
        .store
        .find_otp(Some(&email), None)
        .await?
        .is_some_and(|otp| otp.verified && otp.verification_token.as_deref() == Some(token));
    if !verified {
        warn!("Rejected registration lookup for {}", email);
        return Err(Error::Unauthorized(
            "Invalid verification token".to_string(),
        ));
    }

    state
        .store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| Error::not_found("Registration not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: Value) -> StructuredForm {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_rejects_out_of_range_steps() {
        let request = StepRequest {
            form_data_structured: Some(form(json!({ "personalInfo": { "email": "a@x.com" } }))),
            ..Default::default()
        };

        assert!(validate(0, &request).is_err());
        assert!(validate(9, &request).is_err());
        assert_eq!(validate(3, &request).unwrap().1, "a@x.com");
    }

    #[test]
    fn test_validate_requires_email_and_form() {
        let empty = StepRequest::default();
        assert!(matches!(validate(1, &empty), Err(Error::Validation(_))));

        let no_email = StepRequest {
            form_data_structured: Some(form(json!({ "personalInfo": { "name": "A" } }))),
            ..Default::default()
        };
        assert!(matches!(validate(1, &no_email), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_negative_contribution() {
        let request = StepRequest {
            form_data_structured: Some(form(json!({
                "personalInfo": { "email": "a@x.com" },
                "financial": { "contributionAmount": -5 }
            }))),
            ..Default::default()
        };
        assert!(matches!(validate(8, &request), Err(Error::Validation(_))));
    }

    #[test]
    fn test_client_cannot_select_completed() {
        let mut incoming = form(json!({ "financial": { "paymentStatus": "Completed" } }));
        restrict_financial(&mut incoming, false).unwrap();
        assert!(incoming.financial.unwrap().get("paymentStatus").is_none());

        let mut unknown = form(json!({ "financial": { "paymentStatus": "refunded" } }));
        assert!(restrict_financial(&mut unknown, false).is_err());
    }

    #[test]
    fn test_completed_payment_locks_amount() {
        let mut incoming = form(json!({
            "financial": { "paymentStatus": "pending", "contributionAmount": 10, "proposedAmount": 5 }
        }));
        restrict_financial(&mut incoming, true).unwrap();

        let financial = incoming.financial.unwrap();
        assert!(financial.get("paymentStatus").is_none());
        assert!(financial.get("contributionAmount").is_none());
        assert_eq!(financial.get("proposedAmount"), Some(&json!(5)));
    }
}
