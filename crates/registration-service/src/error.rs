//! Response envelope and the HTTP mapping of domain errors
//!
//! Every response body has the shape
//! `{ "status": "success" | "error", "data"?, "message"?, "error"? }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reunion_common::Error;
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Successful response body
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data: Some(data),
        message: None,
    })
}

pub fn success_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data: Some(data),
        message: Some(message.into()),
    })
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub kind: &'static str,
    pub remaining_attempts: Option<u32>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
            remaining_attempts: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut detail = json!({ "kind": self.kind });
        if let Some(remaining) = self.remaining_attempts {
            detail["remainingAttempts"] = json!(remaining);
        }

        let body = json!({
            "status": "error",
            "message": self.message,
            "error": detail,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_)
            | Error::Conflict(_)
            | Error::OtpExpired
            | Error::InvalidOtp { .. }
            | Error::OtpLocked => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Storage(_) | Error::Json(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let remaining_attempts = match &err {
            Error::InvalidOtp { remaining } => Some(*remaining),
            _ => None,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:#}", err);
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        ApiError {
            status,
            message,
            kind: err.kind(),
            remaining_attempts,
        }
    }
}
