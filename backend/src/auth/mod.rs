use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use cookie::{Cookie, SameSite};
use jsonwebtoken::{encode, decode, Header, EncodingKey, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::{time::{SystemTime, UNIX_EPOCH}, fmt};

use crate::config::Config;

pub mod google;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh";
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug)]
pub enum AuthError {
    Database(sqlx::Error),
    JWT(jsonwebtoken::errors::Error),
    Google(reqwest::Error),
    GoogleRejected(&'static str),
    InvalidToken,
    TokenExpired,
    InvalidSignature,
    MissingToken,
    CsrfMismatch,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::JWT(e) => write!(f, "JWT error: {}", e),
            Self::Google(e) => write!(f, "Google verification error: {}", e),
            Self::GoogleRejected(reason) => write!(f, "Google sign-in rejected: {}", reason),
            Self::InvalidToken => write!(f, "Invalid token"),
            Self::TokenExpired => write!(f, "Token expired"),
            Self::InvalidSignature => write!(f, "Invalid signature"),
            Self::MissingToken => write!(f, "Missing token"),
            Self::CsrfMismatch => write!(f, "CSRF token mismatch"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::JWT(e) => Some(e),
            Self::Google(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::JWT(err)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Google(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Error processing request"),
            Self::JWT(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Token creation failed"),
            Self::Google(_) => (StatusCode::BAD_GATEWAY, "Could not verify Google sign-in"),
            Self::GoogleRejected(_) => (StatusCode::UNAUTHORIZED, "Google sign-in was rejected"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "Token has expired"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "Not signed in"),
            Self::CsrfMismatch => (StatusCode::FORBIDDEN, "Invalid CSRF token"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub csrf_token: String,
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

fn encode_token(user_id: Uuid, secret: &str, lifetime: i64, csrf_token: &str) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now_secs() + lifetime.max(0) as usize,
        csrf_token: csrf_token.to_string(),
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

/// Access token, refresh token and the CSRF token embedded in both.
pub fn create_tokens(user_id: Uuid, config: &Config) -> Result<(String, String, String), AuthError> {
    let csrf_token = Uuid::new_v4().to_string();
    let access_token = encode_token(user_id, &config.jwt_secret, config.access_token_duration, &csrf_token)?;
    let refresh_token = encode_token(user_id, &config.jwt_refresh_secret, config.refresh_token_duration, &csrf_token)?;
    Ok((access_token, refresh_token, csrf_token))
}

fn decode_claims(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation
    ).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

fn subject(claims: &Claims) -> Result<Uuid, AuthError> {
    Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
}

/// Verifies an access token. Returns the user and the CSRF token bound to the session.
pub fn validate_access_jwt(token: &str, config: &Config) -> Result<(Uuid, String), AuthError> {
    let claims = decode_claims(token, &config.jwt_secret)?;
    Ok((subject(&claims)?, claims.csrf_token))
}

pub fn validate_refresh_jwt(token: &str, config: &Config) -> Result<Uuid, AuthError> {
    subject(&decode_claims(token, &config.jwt_refresh_secret)?)
}

fn insert_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Failed to encode cookie {}: {}", cookie.name(), e),
    }
}

fn auth_cookie(name: &'static str, value: String, path: &'static str, max_age: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path(path);
    cookie.set_max_age(time::Duration::seconds(max_age));
    cookie
}

/// Issues fresh tokens as cookies. Returns (access token, csrf token) for the response body.
pub fn set_auth_cookies(user_id: Uuid, config: &Config, headers: &mut HeaderMap) -> Result<(String, String), AuthError> {
    let (access_token, refresh_token, csrf_token) = create_tokens(user_id, config)?;

    insert_cookie(headers, &auth_cookie(
        ACCESS_COOKIE, access_token.clone(), "/", config.access_token_duration, config.cookie_secure,
    ));
    insert_cookie(headers, &auth_cookie(
        REFRESH_COOKIE, refresh_token, REFRESH_COOKIE_PATH, config.refresh_token_duration, config.cookie_secure,
    ));

    Ok((access_token, csrf_token))
}

pub fn clear_auth_cookies(config: &Config, headers: &mut HeaderMap) {
    insert_cookie(headers, &auth_cookie(ACCESS_COOKIE, String::new(), "/", 0, config.cookie_secure));
    insert_cookie(headers, &auth_cookie(REFRESH_COOKIE, String::new(), REFRESH_COOKIE_PATH, 0, config.cookie_secure));
}

/// Finds a named cookie in the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_round_trip() {
        let config = Config::for_tests();
        let user_id = Uuid::new_v4();
        let (access, refresh, _) = create_tokens(user_id, &config).unwrap();
        assert_eq!(validate_access_jwt(&access, &config).unwrap().0, user_id);
        assert_eq!(validate_refresh_jwt(&refresh, &config).unwrap(), user_id);
    }

    #[test]
    fn test_access_token_carries_csrf() {
        let config = Config::for_tests();
        let user_id = Uuid::new_v4();
        let (access, _, csrf) = create_tokens(user_id, &config).unwrap();
        assert_eq!(validate_access_jwt(&access, &config).unwrap(), (user_id, csrf));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = Config::for_tests();
        let (_, refresh, _) = create_tokens(Uuid::new_v4(), &config).unwrap();
        assert!(matches!(validate_access_jwt(&refresh, &config), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = Config::for_tests();
        // Past the default 60 second leeway.
        let token = encode(
            &Header::default(),
            &Claims { sub: Uuid::new_v4().to_string(), exp: now_secs() - 3600, csrf_token: String::new() },
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        ).unwrap();
        assert!(matches!(validate_access_jwt(&token, &config), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_set_and_read_cookies() {
        let config = Config::for_tests();
        let mut headers = HeaderMap::new();
        let (access, _) = set_auth_cookies(Uuid::new_v4(), &config, &mut headers).unwrap();
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);

        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", ACCESS_COOKIE, access)).unwrap(),
        );
        assert_eq!(cookie_value(&request_headers, ACCESS_COOKIE), Some(access));
        assert_eq!(cookie_value(&request_headers, REFRESH_COOKIE), None);
    }
}
