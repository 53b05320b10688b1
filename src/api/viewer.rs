//! Identification of the requesting user.
//!
//! The UI layer in front of this service has already authenticated the user
//! and forwards who they are in `X-Inlay-User` and `X-Inlay-Role`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::models::{UserRole, Viewer};

pub const USER_HEADER: &str = "X-Inlay-User";
pub const ROLE_HEADER: &str = "X-Inlay-Role";

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers)
    }
}

fn viewer_from_headers(headers: &HeaderMap) -> Result<Viewer, (StatusCode, String)> {
    let user_id = match header(headers, USER_HEADER) {
        Some(user_id) if !user_id.is_empty() => user_id,
        _ => {
            tracing::warn!("Missing {} header", USER_HEADER);
            return Err((
                StatusCode::UNAUTHORIZED,
                format!("Missing {} header", USER_HEADER),
            ));
        }
    };

    let role = match header(headers, ROLE_HEADER) {
        None => UserRole::default(),
        Some(role) => UserRole::from_str(&role.to_ascii_lowercase()).ok_or_else(|| {
            tracing::warn!("Invalid {} header: {}", ROLE_HEADER, role);
            (StatusCode::BAD_REQUEST, format!("Unknown role `{}`", role))
        })?,
    };

    Ok(Viewer { user_id, role })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|value| value.trim().to_string())
}
