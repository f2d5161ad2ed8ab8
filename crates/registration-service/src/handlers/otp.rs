//! OTP endpoints

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{success_with_message, ApiError, Envelope},
    extract::header,
    services::otp::{
        self, ClientInfo, SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResponse,
    },
    AppState,
};

fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        // First hop of a proxy chain is the client
        ip_address: header(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string()),
        user_agent: header(headers, "user-agent").map(str::to_string),
    }
}

/// Send an OTP to the registrant's email and WhatsApp number
pub async fn send_otp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<Envelope<SendOtpResponse>>, ApiError> {
    info!("OTP requested (update flow: {})", payload.is_update_flow);

    let response = otp::request_otp(&state, &payload, client_info(&headers)).await?;
    Ok(success_with_message(response, "OTP sent successfully"))
}

/// Verify a submitted OTP
pub async fn verify_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<Envelope<VerifyOtpResponse>>, ApiError> {
    let response = otp::verify_otp(&state, &payload).await?;
    Ok(success_with_message(response, "OTP verified successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_info_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let info = client_info(&headers);

        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
