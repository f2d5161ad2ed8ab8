//! Alumni event registration service
//!
//! REST backend for a multi-step event registration form: OTP-gated sign-up,
//! step-by-step saves with server-side sanitization, serial numbers, payments,
//! duplicate clean-up, contact messages and admin reporting.
//!
//! ## Endpoints
//!
//! Public:
//! - `POST /registrations/send-otp`, `POST /registrations/verify-otp`
//! - `POST /registrations/step/{step}`
//! - `GET /registrations/by-email/{email}` (OTP verification token in
//!   `x-verification-token`)
//! - `POST /registrations/{id}/payment`, `POST /registrations/{id}/add-amount`
//! - `PUT /registrations/{id}`, `POST /transactions`, `POST /contact`
//!
//! Admin (shared key in `x-admin-key`):
//! - `GET /registrations/duplicates/export`
//! - `DELETE /registrations/duplicates/delete-pending`
//! - `POST /registrations/assign-serial`
//! - `/admin/registrations...`, `/admin/analytics`, `/admin/contact...`

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod notify;
pub mod services;
pub mod store;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::Duration;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use notify::Notifier;
use store::Store;

/// Tunables the request handlers need at runtime
#[derive(Debug, Clone)]
pub struct Settings {
    pub otp_expiry_minutes: i64,
    pub otp_max_attempts: u32,
    pub admin_api_key: String,
    pub event_name: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            otp_expiry_minutes: config.otp_expiry_minutes,
            otp_max_attempts: config.otp_max_attempts,
            admin_api_key: config.admin_api_key.clone(),
            event_name: config.event_name.clone(),
        }
    }

    pub fn otp_expiry(&self) -> Duration {
        Duration::minutes(self.otp_expiry_minutes)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            otp_expiry_minutes: 60,
            otp_max_attempts: 5,
            admin_api_key: String::new(),
            event_name: "Alumni Meet".to_string(),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, settings: Settings) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_handler))
        // OTP verification
        .route("/registrations/send-otp", post(handlers::otp::send_otp_handler))
        .route("/registrations/verify-otp", post(handlers::otp::verify_otp_handler))
        // Multi-step form
        .route(
            "/registrations/step/{step}",
            post(handlers::registrations::save_step_handler),
        )
        .route(
            "/registrations/by-email/{email}",
            get(handlers::registrations::get_by_email_handler),
        )
        // Payments
        .route(
            "/registrations/{id}/payment",
            post(handlers::payments::process_payment_handler),
        )
        .route(
            "/registrations/{id}/add-amount",
            post(handlers::payments::add_amount_handler),
        )
        .route(
            "/registrations/{id}",
            put(handlers::payments::update_payment_handler),
        )
        .route("/transactions", post(handlers::payments::register_transaction_handler))
        // Contact form
        .route("/contact", post(handlers::contact::create_message_handler))
        // Admin maintenance
        .route(
            "/registrations/duplicates/export",
            get(handlers::admin::export_duplicates_handler),
        )
        .route(
            "/registrations/duplicates/delete-pending",
            delete(handlers::admin::resolve_duplicates_handler),
        )
        .route(
            "/registrations/assign-serial",
            post(handlers::admin::assign_serial_handler),
        )
        // Admin reporting
        .route(
            "/admin/registrations",
            get(handlers::admin::list_registrations_handler),
        )
        .route(
            "/admin/registrations/{id}",
            get(handlers::admin::get_registration_handler)
                .delete(handlers::admin::delete_registration_handler),
        )
        .route(
            "/admin/registrations/{id}/transactions",
            get(handlers::admin::list_transactions_handler),
        )
        .route("/admin/analytics", get(handlers::admin::analytics_handler))
        // Admin contact inbox
        .route("/admin/contact", get(handlers::contact::list_messages_handler))
        .route("/admin/contact/stats", get(handlers::contact::stats_handler))
        .route("/admin/contact/{id}", get(handlers::contact::get_message_handler))
        .route(
            "/admin/contact/{id}/status",
            patch(handlers::contact::update_status_handler),
        )
        .route(
            "/admin/contact/{id}/notes",
            post(handlers::contact::add_note_handler),
        )
        .route(
            "/admin/contact/{id}/respond",
            post(handlers::contact::respond_handler),
        )
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
