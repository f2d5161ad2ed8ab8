//! One-time password verification record

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-lived verification state for an (email, contact number) identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerification {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,

    pub otp: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Issued on successful verification and checked when step 1 is saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
}

impl OtpVerification {
    pub fn new(email: Option<String>, contact_number: Option<String>, otp: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            contact_number,
            otp,
            created_at: Utc::now(),
            verified: false,
            verified_at: None,
            attempts: 0,
            ip_address: None,
            user_agent: None,
            verification_token: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.created_at > window
    }

    /// Does this record belong to the given identity? Both identifiers must
    /// match when both are given.
    pub fn matches(&self, email: Option<&str>, contact_number: Option<&str>) -> bool {
        let email_ok = |e: &str| self.email.as_deref() == Some(e);
        let contact_ok = |c: &str| self.contact_number.as_deref() == Some(c);
        match (email, contact_number) {
            (Some(e), Some(c)) => email_ok(e) && contact_ok(c),
            (Some(e), None) => email_ok(e),
            (None, Some(c)) => contact_ok(c),
            (None, None) => false,
        }
    }

    /// Shares either identifier with the given identity.
    pub fn overlaps(&self, email: Option<&str>, contact_number: Option<&str>) -> bool {
        (email.is_some() && self.email.as_deref() == email)
            || (contact_number.is_some() && self.contact_number.as_deref() == contact_number)
    }
}

/// Six-digit numeric code, zero padded.
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_6_digits() {
        for _ in 0..100 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_matches_requires_both_identifiers_when_given() {
        let record = OtpVerification::new(
            Some("a@x.com".to_string()),
            Some("9000".to_string()),
            "123456".to_string(),
        );
        assert!(record.matches(Some("a@x.com"), Some("9000")));
        assert!(record.matches(None, Some("9000")));
        assert!(!record.matches(Some("b@x.com"), Some("9000")));
        assert!(!record.matches(None, None));
        assert!(record.overlaps(Some("b@x.com"), Some("9000")));
    }

    #[test]
    fn test_expiry_window() {
        let mut record = OtpVerification::new(Some("a@x.com".to_string()), None, "1".to_string());
        let now = Utc::now();
        record.created_at = now - Duration::minutes(59);
        assert!(!record.is_expired(now, Duration::minutes(60)));
        record.created_at = now - Duration::minutes(61);
        assert!(record.is_expired(now, Duration::minutes(60)));
    }
}
