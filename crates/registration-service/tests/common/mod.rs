//! Shared helpers for the registration service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use registration_service::{
    create_router,
    notify::{NotifyError, Notifier},
    store::MemoryStore,
    AppState, Settings,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tower::ServiceExt; // for `oneshot`

pub const ADMIN_KEY: &str = "test-key";

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that keeps everything it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    emails: Mutex<Vec<SentEmail>>,
    whatsapp: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn emails(&self) -> Vec<SentEmail> {
        self.emails.lock().unwrap().clone()
    }

    pub fn emails_to(&self, to: &str) -> Vec<SentEmail> {
        self.emails().into_iter().filter(|e| e.to == to).collect()
    }

    /// Most recent OTP sent to a WhatsApp number
    pub fn last_otp(&self, contact_number: &str) -> Option<String> {
        self.whatsapp
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == contact_number)
            .map(|(_, otp)| otp.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.emails.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_whatsapp_otp(&self, contact_number: &str, otp: &str) -> Result<(), NotifyError> {
        self.whatsapp
            .lock()
            .unwrap()
            .push((contact_number.to_string(), otp.to_string()));
        Ok(())
    }
}

/// Admin capability headers
pub struct AdminHeaders {
    pub role: &'static str,
    pub all_schools: bool,
    pub schools: &'static str,
}

impl AdminHeaders {
    pub fn super_admin() -> Self {
        Self {
            role: "super-admin",
            all_schools: true,
            schools: "",
        }
    }

    pub fn scoped(role: &'static str, schools: &'static str) -> Self {
        Self {
            role,
            all_schools: false,
            schools,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    /// Verification tokens issued to `register`, by email
    tokens: Mutex<HashMap<String, String>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self::with_settings(store, Settings::default())
    }

    pub fn with_settings(store: MemoryStore, settings: Settings) -> Self {
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = Settings {
            admin_api_key: ADMIN_KEY.to_string(),
            ..settings
        };

        let state = AppState::new(store.clone(), notifier.clone(), settings);

        Self {
            router: create_router(state),
            store,
            notifier,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };

        (status, json)
    }

    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(build(method, uri, body, None)).await
    }

    pub async fn admin(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &AdminHeaders,
    ) -> (StatusCode, Value) {
        self.send(build(method, uri, body, Some(headers))).await
    }

    /// Walk the OTP flow and save step 1; returns the registration id
    pub async fn register(&self, email: &str, contact_number: &str, school: &str) -> String {
        let (status, _) = self
            .call(
                "POST",
                "/registrations/send-otp",
                Some(json!({ "email": email, "contactNumber": contact_number })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let otp = self.notifier.last_otp(contact_number).unwrap();
        let (status, verified) = self
            .call(
                "POST",
                "/registrations/verify-otp",
                Some(json!({ "email": email, "contactNumber": contact_number, "otp": otp })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = verified["data"]["verificationToken"].as_str().unwrap().to_string();
        self.tokens
            .lock()
            .unwrap()
            .insert(email.to_lowercase(), token.clone());

        let (status, saved) = self
            .call(
                "POST",
                "/registrations/step/1",
                Some(json!({
                    "verificationToken": token,
                    "formDataStructured": {
                        "personalInfo": {
                            "name": "Test Person",
                            "email": email,
                            "contactNumber": contact_number,
                            "school": school,
                            "country": "IN",
                            "stateUT": "Kerala",
                            "district": "Kottayam"
                        }
                    }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "step 1 failed: {}", saved);

        saved["data"]["registrationId"].as_str().unwrap().to_string()
    }

    /// Token `register` was issued for an email
    pub fn token(&self, email: &str) -> Option<String> {
        self.tokens.lock().unwrap().get(&email.to_lowercase()).cloned()
    }

    /// Public by-email lookup, optionally carrying a verification token
    pub async fn lookup(&self, email: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("GET")
            .uri(format!("/registrations/by-email/{}", email));
        if let Some(token) = token {
            builder = builder.header("x-verification-token", token);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Lookup with the token `register` was issued
    pub async fn lookup_registered(&self, email: &str) -> (StatusCode, Value) {
        let token = self.token(email);
        self.lookup(email, token.as_deref()).await
    }
}

fn build(method: &str, uri: &str, body: Option<Value>, admin: Option<&AdminHeaders>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(admin) = admin {
        builder = builder
            .header("x-admin-key", ADMIN_KEY)
            .header("x-admin-id", "tester")
            .header("x-admin-role", admin.role)
            .header("x-admin-all-schools", if admin.all_schools { "true" } else { "false" })
            .header("x-admin-schools", admin.schools);
    }

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
