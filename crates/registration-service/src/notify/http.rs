//! JSON-over-HTTP gateways for mail and WhatsApp

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{NotifyError, Notifier};
use crate::config::Config;

/// Posts messages to the configured mail and WhatsApp HTTP APIs
pub struct HttpNotifier {
    client: reqwest::Client,
    mail_api_url: Option<String>,
    mail_api_key: Option<String>,
    mail_from: String,
    whatsapp_api_url: Option<String>,
    whatsapp_api_token: Option<String>,
}

impl HttpNotifier {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            mail_api_url: config.mail_api_url.clone(),
            mail_api_key: config.mail_api_key.clone(),
            mail_from: config.mail_from.clone(),
            whatsapp_api_url: config.whatsapp_api_url.clone(),
            whatsapp_api_token: config.whatsapp_api_token.clone(),
        }
    }

    async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let url = self
            .mail_api_url
            .as_deref()
            .ok_or(NotifyError::Unavailable("email"))?;

        debug!("Sending email to {}: {}", to, subject);

        self.post(
            url,
            self.mail_api_key.as_deref(),
            json!({
                "from": self.mail_from,
                "to": [to],
                "subject": subject,
                "text": body,
            }),
        )
        .await
    }

    async fn send_whatsapp_otp(&self, contact_number: &str, otp: &str) -> Result<(), NotifyError> {
        let url = self
            .whatsapp_api_url
            .as_deref()
            .ok_or(NotifyError::Unavailable("whatsapp"))?;

        debug!("Sending WhatsApp OTP to {}", contact_number);

        self.post(
            url,
            self.whatsapp_api_token.as_deref(),
            json!({
                "to": contact_number,
                "type": "otp",
                "code": otp,
            }),
        )
        .await
    }
}
