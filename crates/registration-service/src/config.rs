//! Configuration management for the registration service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;

/// Which storage backend serves the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("STORE_BACKEND must be 'redis' or 'memory', got '{}'", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    pub store_backend: StoreBackend,

    /// Redis URL for registration storage
    pub redis_url: String,

    /// How long an OTP stays valid
    pub otp_expiry_minutes: i64,

    /// Wrong guesses tolerated before the OTP is discarded
    pub otp_max_attempts: u32,

    /// Shared key the admin gateway presents on every admin request
    pub admin_api_key: String,

    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,

    pub whatsapp_api_url: Option<String>,
    pub whatsapp_api_token: Option<String>,

    /// Event name used in notification texts
    pub event_name: String,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            store_backend: StoreBackend::parse(
                &env::var("STORE_BACKEND").unwrap_or_else(|_| "redis".to_string()),
            )?,

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            otp_expiry_minutes: env::var("OTP_EXPIRY_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid OTP_EXPIRY_MINUTES")?,

            otp_max_attempts: env::var("OTP_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid OTP_MAX_ATTEMPTS")?,

            admin_api_key: env::var("ADMIN_API_KEY").unwrap_or_default(),

            mail_api_url: optional_var("MAIL_API_URL"),
            mail_api_key: optional_var("MAIL_API_KEY"),
            mail_from: env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),

            whatsapp_api_url: optional_var("WHATSAPP_API_URL"),
            whatsapp_api_token: optional_var("WHATSAPP_API_TOKEN"),

            event_name: env::var("EVENT_NAME").unwrap_or_else(|_| "Alumni Meet".to_string()),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.otp_expiry_minutes <= 0 {
            anyhow::bail!("OTP_EXPIRY_MINUTES must be greater than 0");
        }

        if self.otp_max_attempts == 0 {
            anyhow::bail!("OTP_MAX_ATTEMPTS must be greater than 0");
        }

        if self.admin_api_key.trim().is_empty() {
            anyhow::bail!("ADMIN_API_KEY must be set");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
