use crate::config::AuthConfig;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::ApiError;

const REALM: &str = "Basic realm=\"hab-data-api\"";

/// Rejects requests without the configured basic credentials.
pub async fn require_basic_auth(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match credentials(request.headers()) {
        Some((username, password)) if credentials_match(&auth, &username, &password) => {
            next.run(request).await
        }
        presented => {
            tracing::debug!(
                path = %request.uri().path(),
                presented = presented.is_some(),
                "rejected unauthenticated request"
            );
            unauthorized()
        }
    }
}

/// Compares in constant time; both fields are always checked.
fn credentials_match(auth: &AuthConfig, username: &str, password: &str) -> bool {
    let username = username.as_bytes().ct_eq(auth.username.as_bytes());
    let password = password.as_bytes().ct_eq(auth.password.as_bytes());
    (username & password).into()
}

fn unauthorized() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new("UNAUTHORIZED", "Valid credentials are required")),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

/// Username and password from an `Authorization: Basic` header.
pub fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
