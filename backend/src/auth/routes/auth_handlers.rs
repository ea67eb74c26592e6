use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::rate_limit::RateLimitType;
use tracing::{info, error, warn};

use crate::auth::{
    self, google, AuthError, REFRESH_COOKIE,
    models::{GoogleLoginRequest, AuthResponse, RefreshResponse},
    services::{record_login_attempt, LoginAttempt},
};
use crate::error::Error;
use crate::services::user_service;
use crate::utils::client_ip;
use crate::{rate_limit, AppState};

pub async fn google_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GoogleLoginRequest>,
) -> Result<Response, Error> {
    let ip_address = client_ip(&headers);
    rate_limit::enforce(&state.redis, RateLimitType::Login, &ip_address).await?;

    let verified = google::verify_id_token(&request.id_token, &state.config.google_client_id).await;

    let attempt = LoginAttempt::from_verification(&verified, &ip_address);
    if let Err(e) = record_login_attempt(&state.pool, &attempt).await {
        error!("Failed to record login attempt: {:?}", e);
    }

    let identity = verified.map_err(|e| {
        warn!(event = "login_rejected", ip = %ip_address, "Google sign-in failed: {}", e);
        e
    })?;

    let (user_id, user) = user_service::upsert_google_user(&state.pool, &identity).await?;

    let mut response_headers = HeaderMap::new();
    let (token, csrf_token) = auth::set_auth_cookies(user_id, &state.config, &mut response_headers)?;

    info!(
        event = "login",
        user_id = %user_id,
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "User signed in: {}", user.name
    );

    Ok((response_headers, Json(AuthResponse { csrf_token, token, user })).into_response())
}

pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let refresh = auth::cookie_value(&headers, REFRESH_COOKIE).ok_or(AuthError::MissingToken)?;
    let user_id = auth::validate_refresh_jwt(&refresh, &state.config)?;

    // The account has to still exist for the session to be renewed.
    user_service::get_profile(&state.pool, user_id).await?;

    let mut response_headers = HeaderMap::new();
    let (token, csrf_token) = auth::set_auth_cookies(user_id, &state.config, &mut response_headers)?;

    Ok((response_headers, Json(RefreshResponse { csrf_token, token })).into_response())
}

pub async fn logout(State(state): State<AppState>) -> Response {
    let mut response_headers = HeaderMap::new();
    auth::clear_auth_cookies(&state.config, &mut response_headers);
    (response_headers, Json(json!({ "message": "Signed out" }))).into_response()
}
