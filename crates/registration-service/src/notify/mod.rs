//! Outbound notifications (email and WhatsApp)
//!
//! Delivery is always best-effort: callers log a `NotifyError` and carry on.

mod http;
pub mod templates;

pub use http::HttpNotifier;

use async_trait::async_trait;
use thiserror::Error;

/// Notification delivery error
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Channel not configured: {0}")]
    Unavailable(&'static str),

    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Message channels the service can deliver through
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    async fn send_whatsapp_otp(&self, contact_number: &str, otp: &str) -> Result<(), NotifyError>;
}
