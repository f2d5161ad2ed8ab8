//! Admin capability extraction
//!
//! The admin gateway authenticates the operator and forwards their
//! capabilities as headers along with the shared service key.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use reunion_common::{AdminContext, AdminRole};
use std::sync::Arc;
use tracing::warn;

use crate::{error::ApiError, AppState};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const ADMIN_ID_HEADER: &str = "x-admin-id";
pub const ADMIN_ROLE_HEADER: &str = "x-admin-role";
pub const ADMIN_ALL_SCHOOLS_HEADER: &str = "x-admin-all-schools";
pub const ADMIN_SCHOOLS_HEADER: &str = "x-admin-schools";

/// Token from OTP verification, required to read a registration back
pub const VERIFICATION_TOKEN_HEADER: &str = "x-verification-token";

/// Authenticated admin capabilities
#[derive(Debug, Clone)]
pub struct Admin(pub AdminContext);

/// Trimmed, non-empty header value
pub(crate) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// Build the admin context from request headers
pub fn admin_from_headers(headers: &HeaderMap, expected_key: &str) -> Result<AdminContext, ApiError> {
    let presented = header(headers, ADMIN_KEY_HEADER)
        .ok_or_else(|| unauthorized("Admin credentials required"))?;
    if expected_key.is_empty() || presented != expected_key {
        warn!("Rejected admin request with invalid key");
        return Err(unauthorized("Invalid admin credentials"));
    }

    let role = match header(headers, ADMIN_ROLE_HEADER) {
        Some(value) => AdminRole::parse(value).ok_or_else(|| unauthorized("Unknown admin role"))?,
        None => AdminRole::Viewer,
    };

    let can_view_all_schools = header(headers, ADMIN_ALL_SCHOOLS_HEADER)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    let assigned_schools = header(headers, ADMIN_SCHOOLS_HEADER)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(AdminContext {
        admin_id: header(headers, ADMIN_ID_HEADER).unwrap_or("admin").to_string(),
        role,
        can_view_all_schools,
        assigned_schools,
    })
}

impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        admin_from_headers(&parts.headers, &state.settings.admin_api_key).map(Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_missing_or_wrong_key_is_unauthorized() {
        let err = admin_from_headers(&headers(&[]), "secret").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = admin_from_headers(&headers(&[(ADMIN_KEY_HEADER, "nope")]), "secret").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_capabilities_are_read_from_headers() {
        let ctx = admin_from_headers(
            &headers(&[
                (ADMIN_KEY_HEADER, "secret"),
                (ADMIN_ID_HEADER, "ops-1"),
                (ADMIN_ROLE_HEADER, "admin"),
                (ADMIN_SCHOOLS_HEADER, "GHSS, St. Mary's"),
            ]),
            "secret",
        )
        .unwrap();

        assert_eq!(ctx.admin_id, "ops-1");
        assert_eq!(ctx.role, AdminRole::Admin);
        assert!(!ctx.can_view_all_schools);
        assert_eq!(ctx.assigned_schools, vec!["GHSS", "St. Mary's"]);
    }

    #[test]
    fn test_role_defaults_to_viewer() {
        let ctx = admin_from_headers(&headers(&[(ADMIN_KEY_HEADER, "secret")]), "secret").unwrap();
        assert_eq!(ctx.role, AdminRole::Viewer);
        assert!(!ctx.can_modify());
    }
}
