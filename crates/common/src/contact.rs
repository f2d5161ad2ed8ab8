//! Contact messages sent through the public site

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactStatus {
    #[default]
    New,
    Read,
    InProgress,
    Responded,
    Resolved,
    Spam,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 6] = [
        ContactStatus::New,
        ContactStatus::Read,
        ContactStatus::InProgress,
        ContactStatus::Responded,
        ContactStatus::Resolved,
        ContactStatus::Spam,
    ];

    fn rank(self) -> Option<u8> {
        match self {
            ContactStatus::New => Some(0),
            ContactStatus::Read => Some(1),
            ContactStatus::InProgress => Some(2),
            ContactStatus::Responded => Some(3),
            ContactStatus::Resolved => Some(4),
            ContactStatus::Spam => None,
        }
    }

    /// Messages move forward through the workflow; anything can be marked
    /// spam, nothing leaves spam.
    pub fn can_transition_to(self, next: ContactStatus) -> bool {
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(current), Some(wanted)) => wanted >= current,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Read => "read",
            ContactStatus::InProgress => "in-progress",
            ContactStatus::Responded => "responded",
            ContactStatus::Resolved => "resolved",
            ContactStatus::Spam => "spam",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactCategory {
    #[default]
    General,
    Registration,
    Payment,
    Sponsorship,
    Technical,
    Accommodation,
    Transportation,
}

impl ContactCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactCategory::General => "general",
            ContactCategory::Registration => "registration",
            ContactCategory::Payment => "payment",
            ContactCategory::Sponsorship => "sponsorship",
            ContactCategory::Technical => "technical",
            ContactCategory::Accommodation => "accommodation",
            ContactCategory::Transportation => "transportation",
        }
    }

    /// Keyword classification over subject and body; first group wins.
    pub fn classify(subject: &str, message: &str) -> Self {
        const GROUPS: [(ContactCategory, &[&str]); 6] = [
            (
                ContactCategory::Payment,
                &["payment", "refund", "transaction", "fee", "paid"],
            ),
            (
                ContactCategory::Registration,
                &["register", "registration", "otp", "form", "serial"],
            ),
            (
                ContactCategory::Sponsorship,
                &["sponsor", "donation", "contribute"],
            ),
            (
                ContactCategory::Accommodation,
                &["stay", "hotel", "accommodation", "room"],
            ),
            (
                ContactCategory::Transportation,
                &["travel", "transport", "pickup", "parking", "ride"],
            ),
            (
                ContactCategory::Technical,
                &["error", "bug", "website", "login", "crash"],
            ),
        ];

        let text = format!("{} {}", subject, message).to_lowercase();
        GROUPS
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(ContactCategory::General)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub message: String,
    pub responded_by: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNote {
    pub note: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub email: String,

    pub subject: String,

    pub message: String,

    #[serde(default)]
    pub status: ContactStatus,

    #[serde(default)]
    pub category: ContactCategory,

    #[serde(default)]
    pub priority: ContactPriority,

    /// Latest response only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<ResponseData>,

    #[serde(default)]
    pub admin_notes: Vec<AdminNote>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ContactMessage {
    /// New message; a missing or general category is classified from the text
    /// and payment messages default to high priority.
    pub fn new(
        name: String,
        email: String,
        subject: String,
        message: String,
        category: Option<ContactCategory>,
        priority: Option<ContactPriority>,
    ) -> Self {
        let category = match category {
            Some(ContactCategory::General) | None => ContactCategory::classify(&subject, &message),
            Some(explicit) => explicit,
        };
        let priority = priority.unwrap_or(match category {
            ContactCategory::Payment => ContactPriority::High,
            _ => ContactPriority::Normal,
        });
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            subject,
            message,
            status: ContactStatus::New,
            category,
            priority,
            response_data: None,
            admin_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_keyword() {
        assert_eq!(
            ContactCategory::classify("Refund please", "I paid twice"),
            ContactCategory::Payment
        );
        assert_eq!(
            ContactCategory::classify("Hi", "Did not get my OTP"),
            ContactCategory::Registration
        );
        assert_eq!(
            ContactCategory::classify("Hello", "Looking forward to it"),
            ContactCategory::General
        );
    }

    #[test]
    fn test_explicit_category_is_kept() {
        let msg = ContactMessage::new(
            "A".into(),
            "a@x.com".into(),
            "payment".into(),
            "hotel".into(),
            Some(ContactCategory::Accommodation),
            None,
        );
        assert_eq!(msg.category, ContactCategory::Accommodation);
        assert_eq!(msg.priority, ContactPriority::Normal);
    }

    #[test]
    fn test_payment_messages_default_high_priority() {
        let msg = ContactMessage::new(
            "A".into(),
            "a@x.com".into(),
            "Payment failed".into(),
            "Money debited".into(),
            None,
            None,
        );
        assert_eq!(msg.category, ContactCategory::Payment);
        assert_eq!(msg.priority, ContactPriority::High);
    }

    #[test]
    fn test_status_transitions() {
        assert!(ContactStatus::New.can_transition_to(ContactStatus::Responded));
        assert!(ContactStatus::Resolved.can_transition_to(ContactStatus::Spam));
        assert!(!ContactStatus::Responded.can_transition_to(ContactStatus::Read));
        assert!(!ContactStatus::Spam.can_transition_to(ContactStatus::New));
    }
}
