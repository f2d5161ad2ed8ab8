//! Registration Service
//!
//! REST API for alumni event registration, OTP verification and payments

use anyhow::{Context, Result};
use registration_service::{
    config::{Config, StoreBackend},
    create_router,
    notify::HttpNotifier,
    store::{MemoryStore, RedisStore, Store},
    AppState, Settings,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registration_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting Registration Service");
    info!("Store backend: {:?}", config.store_backend);
    info!("OTP expiry: {} minutes", config.otp_expiry_minutes);

    // Initialize storage
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Redis => {
            info!("Redis URL: {}", config.redis_url);
            Arc::new(
                RedisStore::new(&config.redis_url)
                    .await
                    .context("Failed to initialize storage")?,
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if config.mail_api_url.is_none() {
        warn!("MAIL_API_URL not set; emails will not be delivered");
    }
    if config.whatsapp_api_url.is_none() {
        warn!("WHATSAPP_API_URL not set; WhatsApp OTPs will not be delivered");
    }
    let notifier = Arc::new(HttpNotifier::new(&config));

    // Create router
    let state = AppState::new(store, notifier, Settings::from_config(&config));
    let app = create_router(state);

    // Bind and serve
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Registration Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
