//! OTP issue and verification
//!
//! Codes are six digits, valid for the configured window and locked after the
//! configured number of attempts. Each identity holds at most one record:
//! issuing a new code replaces every record sharing its email or number.

use chrono::Utc;
use rand::Rng;
use reunion_common::{
    generate_otp, normalize_email, Error, OtpVerification, Registration, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{notify::templates, AppState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub contact_number: Option<String>,

    /// Re-verification of an existing registrant who wants to edit it
    #[serde(default)]
    pub is_update_flow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    pub email_sent: bool,
    pub whatsapp_sent: bool,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub contact_number: Option<String>,

    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub verified: bool,
    pub registration_exists: bool,
    pub is_complete: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,

    pub verification_token: String,
}

/// Where an OTP request came from, stored on the record for auditing
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn clean_email(email: Option<&str>) -> Option<String> {
    email.map(normalize_email).filter(|e| !e.is_empty())
}

fn clean_contact(contact_number: Option<&str>) -> Option<String> {
    contact_number
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn verification_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Registrations sharing either identifier
async fn registrations_for(
    state: &AppState,
    email: Option<&str>,
    contact_number: Option<&str>,
) -> Result<Vec<Registration>> {
    let mut found = Vec::new();
    if let Some(email) = email {
        found.extend(state.store.find_by_email(email).await?);
    }
    if let Some(contact_number) = contact_number {
        for registration in state.store.find_by_contact(contact_number).await? {
            if !found.iter().any(|r| r.id == registration.id) {
                found.push(registration);
            }
        }
    }
    Ok(found)
}

/// Issue a fresh code and send it on every channel the identity has
pub async fn request_otp(
    state: &AppState,
    request: &SendOtpRequest,
    client: ClientInfo,
) -> Result<SendOtpResponse> {
    let email = clean_email(request.email.as_deref());
    let contact_number = clean_contact(request.contact_number.as_deref());

    if email.is_none() && contact_number.is_none() {
        return Err(Error::validation("Email or contact number is required"));
    }
    if !request.is_update_flow && (email.is_none() || contact_number.is_none()) {
        return Err(Error::validation(
            "Both email and contact number are required",
        ));
    }
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(Error::validation("Invalid email address"));
    }

    let existing = registrations_for(state, email.as_deref(), contact_number.as_deref()).await?;
    if request.is_update_flow {
        if existing.is_empty() {
            return Err(Error::not_found(
                "No registration found for these details",
            ));
        }
    } else if existing.iter().any(|r| r.form_submission_complete) {
        return Err(Error::conflict(
            "A registration with this email or contact number is already complete",
        ));
    }

    let mut record = OtpVerification::new(email.clone(), contact_number.clone(), generate_otp());
    record.ip_address = client.ip_address;
    record.user_agent = client.user_agent;
    state.store.replace_otp(&record).await?;

    let expiry_minutes = state.settings.otp_expiry_minutes;
    let email_delivery = async {
        let Some(to) = email.as_deref() else {
            return false;
        };
        let content = templates::otp_email(&state.settings.event_name, &record.otp, expiry_minutes);
        match state.notifier.send_email(to, &content.subject, &content.text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("OTP email to {} failed: {}", to, e);
                false
            }
        }
    };
    let whatsapp_delivery = async {
        let Some(number) = contact_number.as_deref() else {
            return false;
        };
        match state.notifier.send_whatsapp_otp(number, &record.otp).await {
            Ok(()) => true,
            Err(e) => {
                warn!("OTP WhatsApp message to {} failed: {}", number, e);
                false
            }
        }
    };
    let (email_sent, whatsapp_sent) = tokio::join!(email_delivery, whatsapp_delivery);

    info!(
        "Issued OTP {} (email sent: {}, whatsapp sent: {})",
        record.id, email_sent, whatsapp_sent
    );

    Ok(SendOtpResponse {
        email_sent,
        whatsapp_sent,
        expires_in_minutes: expiry_minutes,
    })
}

/// Check a submitted code against the identity's record
pub async fn verify_otp(state: &AppState, request: &VerifyOtpRequest) -> Result<VerifyOtpResponse> {
    let email = clean_email(request.email.as_deref());
    let contact_number = clean_contact(request.contact_number.as_deref());
    let otp = request.otp.trim();

    if otp.is_empty() {
        return Err(Error::validation("OTP is required"));
    }
    if email.is_none() && contact_number.is_none() {
        return Err(Error::validation("Email or contact number is required"));
    }

    let Some(mut record) = state
        .store
        .find_otp(email.as_deref(), contact_number.as_deref())
        .await?
    else {
        return Err(Error::not_found(
            "No OTP request found. Please request a new OTP",
        ));
    };

    let now = Utc::now();
    if record.is_expired(now, state.settings.otp_expiry()) {
        return Err(Error::OtpExpired);
    }

    let max_attempts = state.settings.otp_max_attempts;
    record.attempts += 1;
    if record.attempts > max_attempts {
        state.store.delete_otp(&record.id).await?;
        warn!("OTP {} locked after {} attempts", record.id, max_attempts);
        return Err(Error::OtpLocked);
    }

    if record.otp != otp {
        state.store.save_otp(&record).await?;
        return Err(Error::InvalidOtp {
            remaining: max_attempts - record.attempts,
        });
    }

    let token = verification_token();
    record.verified = true;
    record.verified_at = Some(now);
    record.verification_token = Some(token.clone());
    state.store.save_otp(&record).await?;

    let existing = registrations_for(state, email.as_deref(), contact_number.as_deref()).await?;
    let registration = existing.first();

    info!("Verified OTP {}", record.id);

    Ok(VerifyOtpResponse {
        verified: true,
        registration_exists: registration.is_some(),
        is_complete: registration.is_some_and(|r| r.form_submission_complete),
        registration_id: registration.map(|r| r.id.clone()),
        verification_token: token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        notify::{NotifyError, Notifier},
        store::{MemoryStore, OtpStore},
        Settings,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outbox {
        emails: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send_email(&self, to: &str, _subject: &str, body: &str) -> std::result::Result<(), NotifyError> {
            self.emails.lock().unwrap().push(format!("{}|{}", to, body));
            Ok(())
        }

        async fn send_whatsapp_otp(&self, _contact: &str, _otp: &str) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::Unavailable("whatsapp"))
        }
    }

    fn state(store: Arc<MemoryStore>) -> AppState {
        AppState::new(store, Arc::new(Outbox::default()), Settings::default())
    }

    fn send(email: &str, contact: &str) -> SendOtpRequest {
        SendOtpRequest {
            email: Some(email.to_string()),
            contact_number: Some(contact.to_string()),
            is_update_flow: false,
        }
    }

    #[tokio::test]
    async fn test_request_reports_channel_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone());

        let response = request_otp(&state, &send("A@X.com", "9000"), ClientInfo::default())
            .await
            .unwrap();

        assert!(response.email_sent);
        assert!(!response.whatsapp_sent);
        assert_eq!(response.expires_in_minutes, 60);

        let record = store.find_otp(Some("a@x.com"), Some("9000")).await.unwrap().unwrap();
        assert_eq!(record.attempts, 0);
        assert!(!record.verified);
    }

    #[tokio::test]
    async fn test_new_registration_needs_both_identifiers() {
        let state = state(Arc::new(MemoryStore::new()));
        let request = SendOtpRequest {
            email: Some("a@x.com".to_string()),
            ..Default::default()
        };

        let err = request_otp(&state, &request, ClientInfo::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_verify_issues_token() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone());
        let record = OtpVerification::new(
            Some("a@x.com".to_string()),
            Some("9000".to_string()),
            "123456".to_string(),
        );
        store.insert_otp(record).await;

        let response = verify_otp(
            &state,
            &VerifyOtpRequest {
                email: Some("a@x.com".to_string()),
                contact_number: Some("9000".to_string()),
                otp: "123456".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(response.verified);
        assert!(!response.registration_exists);
        assert_eq!(response.verification_token.len(), 32);

        let stored = store.find_otp(Some("a@x.com"), None).await.unwrap().unwrap();
        assert!(stored.verified);
        assert_eq!(stored.verification_token, Some(response.verification_token));
    }
}
