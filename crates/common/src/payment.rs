//! Payment status, payment history entries and transactions

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Payment state of a registration.
///
/// Wire values keep the historical spellings ("Completed" is capitalised, the
/// rest are kebab-case); parsing is case-insensitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    #[serde(rename = "not-started", alias = "Not-Started", alias = "not_started")]
    NotStarted,

    #[serde(rename = "pending", alias = "Pending")]
    Pending,

    #[serde(rename = "Completed", alias = "completed")]
    Completed,

    #[serde(rename = "failed", alias = "Failed")]
    Failed,

    #[serde(rename = "financial-difficulty", alias = "Financial-Difficulty")]
    FinancialDifficulty,

    #[serde(rename = "foreign-transaction", alias = "Foreign-Transaction")]
    ForeignTransaction,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::NotStarted,
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::FinancialDifficulty,
        PaymentStatus::ForeignTransaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::NotStarted => "not-started",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::FinancialDifficulty => "financial-difficulty",
            PaymentStatus::ForeignTransaction => "foreign-transaction",
        }
    }

    /// Statuses a registrant may pick on the public form. The rest are only
    /// set by payment processing.
    pub fn is_client_selectable(self) -> bool {
        match self {
            PaymentStatus::NotStarted
            | PaymentStatus::Pending
            | PaymentStatus::FinancialDifficulty
            | PaymentStatus::ForeignTransaction => true,
            PaymentStatus::Completed | PaymentStatus::Failed => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().to_ascii_lowercase() == wanted)
            .ok_or_else(|| Error::validation(format!("Unknown payment status: {}", s)))
    }
}

/// One entry of a registration's append-only payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub payment_method: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// A money movement, optionally linked to a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,

    pub amount: f64,

    pub status: TransactionStatus,

    #[serde(default)]
    pub purpose: String,

    #[serde(default)]
    pub is_anonymous: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    /// Key under which a retried submission is recognised
    pub idempotency_key: String,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a transaction; a missing id is generated, a missing idempotency
    /// key falls back to the transaction id.
    pub fn new(
        transaction_id: Option<String>,
        registration_id: Option<String>,
        amount: f64,
        status: TransactionStatus,
        purpose: impl Into<String>,
        idempotency_key: Option<String>,
    ) -> Self {
        let transaction_id = transaction_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_transaction_id);
        let idempotency_key = idempotency_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| transaction_id.clone());

        Self {
            transaction_id,
            registration_id,
            amount,
            status,
            purpose: purpose.into(),
            is_anonymous: false,
            payment_method: None,
            idempotency_key,
            created_at: Utc::now(),
        }
    }

    pub fn history_entry(&self) -> PaymentRecord {
        PaymentRecord {
            amount: self.amount,
            date: self.created_at,
            payment_method: self
                .payment_method
                .clone()
                .unwrap_or_else(|| "online".to_string()),
            transaction_id: self.transaction_id.clone(),
        }
    }
}

/// `TXN-<epochMillis>-<rand4>`
pub fn generate_transaction_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("TXN-{}-{:04}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_parse_is_case_insensitive() {
        assert_eq!(
            "completed".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::Completed
        );
        assert_eq!(
            "Pending".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::Pending
        );
        assert_eq!(
            "financial_difficulty".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::FinancialDifficulty
        );
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_payment_status_wire_format() {
        let json = serde_json::to_string(&PaymentStatus::Completed).unwrap();
        assert_eq!(json, "\"Completed\"");
        let parsed: PaymentStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, PaymentStatus::Completed);
    }

    #[test]
    fn test_generated_transaction_id_format() {
        let id = generate_transaction_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TXN");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_idempotency_key_defaults_to_transaction_id() {
        let txn = Transaction::new(
            Some("TXN-1".to_string()),
            None,
            10.0,
            TransactionStatus::Completed,
            "donation",
            None,
        );
        assert_eq!(txn.idempotency_key, "TXN-1");

        let generated = Transaction::new(None, None, 5.0, TransactionStatus::Pending, "", None);
        assert!(generated.transaction_id.starts_with("TXN-"));
    }
}
