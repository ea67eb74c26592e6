use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{header, HeaderValue, Method, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{extract::State, Router};
use once_cell::sync::Lazy;
use redis::Client as RedisClient;
use shared::rate_limit::RateLimitType;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info, warn};

use crate::auth::middleware::{require_auth, UserId};
use crate::auth::routes::{google_login, logout, refresh_token};
use crate::config::Config;
use crate::games::backend_wheel_game::create_router as create_wheel_game_router;
use crate::services::referral_service::apply_referral_handler;
use crate::services::user_service::{get_profile_handler, update_profile_handler};
use crate::services::wheel_sessions::WheelSessions;
use crate::services::withdrawal_service::{create_withdrawal_handler, get_tiers, list_withdrawals_handler};
use crate::utils::client_ip;

mod auth;
mod config;
mod error;
mod games;
mod logging;
mod rate_limit;
mod services;
mod utils;

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    redis: RedisClient,
    config: Arc<Config>,
    wheels: WheelSessions,
}

const IP_MAX_REQUESTS: u32 = 1000;
const IP_WINDOW: Duration = Duration::from_secs(10);
const IP_RATE_LIMIT_ERROR: &str = "Too many requests, please try again later.";

// Time before we log the same IP again
const IP_LOG_EXPIRY: Duration = Duration::from_secs(3600);

const WHEEL_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
const WHEEL_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub async fn health_check() -> &'static str {
    "OK"
}

async fn api_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let user_id = request
        .extensions()
        .get::<UserId>()
        .map(|id| id.0.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    match rate_limit::enforce(&state.redis, RateLimitType::Api, &user_id).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rate:ip:{}", client_ip(request.headers()));

    match rate_limit::enforce_key(&state.redis, &key, IP_MAX_REQUESTS, IP_WINDOW, IP_RATE_LIMIT_ERROR).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

// Track which IP addresses have been logged and when
static LOGGED_IPS: Lazy<Mutex<HashMap<String, Instant>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn should_log_visit(ip: &str, now: Instant) -> bool {
    let Ok(mut logged_ips) = LOGGED_IPS.lock() else {
        return false;
    };
    note_visit(&mut logged_ips, ip, now)
}

/// Records a visit and reports whether it should be logged. Expired entries are dropped.
fn note_visit(logged_ips: &mut HashMap<String, Instant>, ip: &str, now: Instant) -> bool {
    logged_ips.retain(|_, last| now.duration_since(*last) < IP_LOG_EXPIRY);

    if logged_ips.contains_key(ip) {
        return false;
    }
    logged_ips.insert(ip.to_string(), now);
    true
}

async fn log_visit_middleware(request: Request<Body>, next: Next) -> Response {
    let ip = client_ip(request.headers());

    if should_log_visit(&ip, Instant::now()) {
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown");
        info!("👋 Visit from {} to {} ({})", ip, request.uri().path(), user_agent);
    }

    next.run(request).await
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::OPTIONS, Method::DELETE])
        .allow_headers(vec![
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static(auth::CSRF_HEADER),
        ])
        .allow_credentials(true)
}

pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/google", post(google_login))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout));

    // require_auth is the outer layer so the API limiter sees the user id.
    let protected_routes = Router::new()
        .route("/api/profile", get(get_profile_handler).put(update_profile_handler))
        .route("/api/referral", post(apply_referral_handler))
        .route("/api/withdrawals", get(list_withdrawals_handler).post(create_withdrawal_handler))
        .nest("/api/wheel", create_wheel_game_router())
        .layer(middleware::from_fn_with_state(state.clone(), api_rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health_check", get(health_check))
        .route("/api/withdrawals/tiers", get(get_tiers))
        .nest("/api/auth", auth_routes)
        .merge(protected_routes)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors_layer(&state.config))
        .layer(middleware::from_fn_with_state(state.clone(), ip_rate_limit_middleware))
        .layer(middleware::from_fn(log_visit_middleware))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::setup()?;

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready, migrations applied");

    let state = AppState {
        pool,
        redis: RedisClient::open(config.redis_url.as_str())?,
        config: Arc::new(config),
        wheels: WheelSessions::new(),
    };

    // Drop wheel sessions nobody has touched in a while
    let wheels = state.wheels.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WHEEL_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = wheels.cleanup_idle(WHEEL_SESSION_IDLE).await;
            if removed > 0 {
                info!("Cleaned up {} idle wheel sessions", removed);
            }
        }
    });

    let addr = state.config.bind_addr;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind {}: {}", addr, e);
        e
    })?;
    info!("listening on {}", addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config::for_tests();
        AppState {
            pool: PgPoolOptions::new().connect_lazy(&config.database_url).unwrap(),
            // Nothing listens here, so the rate limiters step aside.
            redis: RedisClient::open("redis://127.0.0.1:1").unwrap(),
            config: Arc::new(config),
            wheels: WheelSessions::new(),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app(test_state())
            .oneshot(Request::get("/api/health_check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            HeaderValue::from_static("no-store")
        );
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_tiers_are_public() {
        let response = app(test_state())
            .oneshot(Request::get("/api/withdrawals/tiers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tiers: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(tiers.as_array().map(Vec::len), Some(shared::models::WITHDRAWAL_TIERS.len()));
    }

    #[tokio::test]
    async fn test_wheel_requires_sign_in() {
        let response = app(test_state())
            .oneshot(Request::get("/api/wheel").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cookie_session_needs_csrf_header() {
        let state = test_state();
        let (access, _, _) = auth::create_tokens(uuid::Uuid::new_v4(), &state.config).unwrap();

        let request = Request::post("/api/wheel/spin")
            .header(header::COOKIE, format!("{}={}", auth::ACCESS_COOKIE, access))
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_visits_logged_once_per_expiry() {
        let now = Instant::now();
        assert!(should_log_visit("198.51.100.23", now));
        assert!(!should_log_visit("198.51.100.23", now + Duration::from_secs(60)));
        assert!(should_log_visit("198.51.100.23", now + IP_LOG_EXPIRY * 2));
    }

    #[test]
    fn test_expired_visits_are_evicted() {
        let mut logged_ips = HashMap::new();
        let now = Instant::now();
        assert!(note_visit(&mut logged_ips, "203.0.113.1", now));
        assert!(note_visit(&mut logged_ips, "203.0.113.2", now + Duration::from_secs(60)));
        assert_eq!(logged_ips.len(), 2);

        assert!(note_visit(&mut logged_ips, "203.0.113.3", now + IP_LOG_EXPIRY + Duration::from_secs(1)));
        assert!(!logged_ips.contains_key("203.0.113.1"));
        assert_eq!(logged_ips.len(), 2);
    }
}
