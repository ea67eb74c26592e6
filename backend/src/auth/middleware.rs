use axum::{
    extract::State,
    http::{HeaderMap, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    body::Body,
};
use uuid::Uuid;

use super::{cookie_value, validate_access_jwt, AuthError, ACCESS_COOKIE, CSRF_HEADER};
use crate::AppState;

#[derive(Clone, Copy, Debug)]
pub struct UserId(pub Uuid);

enum AccessToken {
    Bearer(String),
    Cookie(String),
}

/// Bearer header first, then the access cookie.
fn access_token(headers: &HeaderMap) -> Option<AccessToken> {
    let bearer = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    match bearer {
        Some(token) => Some(AccessToken::Bearer(token)),
        None => cookie_value(headers, ACCESS_COOKIE)
            .filter(|token| !token.is_empty())
            .map(AccessToken::Cookie),
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Cookie sessions must echo the CSRF token on anything that writes.
fn check_csrf(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
    let sent = headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok());
    match sent {
        Some(token) if !expected.is_empty() && token == expected => Ok(()),
        _ => Err(AuthError::CsrfMismatch),
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match access_token(request.headers()) {
        Some(token) => token,
        None => return AuthError::MissingToken.into_response(),
    };

    let (raw, from_cookie) = match &token {
        AccessToken::Bearer(raw) => (raw.as_str(), false),
        AccessToken::Cookie(raw) => (raw.as_str(), true),
    };

    let (user_id, csrf_token) = match validate_access_jwt(raw, &state.config) {
        Ok(validated) => validated,
        Err(e) => {
            tracing::debug!("Rejected access token: {}", e);
            return e.into_response();
        }
    };

    if from_cookie && !is_safe(request.method()) {
        if let Err(e) = check_csrf(request.headers(), &csrf_token) {
            tracing::warn!("CSRF check failed for user {}", user_id);
            return e.into_response();
        }
    }

    request.extensions_mut().insert(UserId(user_id));
    next.run(request).await
}
