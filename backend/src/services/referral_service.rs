use axum::{extract::{Extension, State}, Json};
use shared::constants::{INVALID_REFERRAL_CODE_ERROR, REFERRAL_BONUS};
use shared::models::{ActionResponse, ReferralRequest};
use shared::rate_limit::RateLimitType;
use shared::validation::validate_referral_code;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::points_service::add_points;
use super::user_service::{fetch_user_for_update, UserRow, USER_COLUMNS};
use crate::auth::middleware::UserId;
use crate::error::Error;
use crate::{rate_limit, AppState};

pub const ALREADY_USED: &str = "You have already used a referral code.";
pub const UNKNOWN_CODE: &str = "Invalid referral code.";
pub const OWN_CODE: &str = "You cannot use your own referral code.";

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Checks whether `user` may redeem the code that resolved to `referrer`.
pub fn check_referral(user: &UserRow, referrer: Option<&UserRow>) -> Result<(), &'static str> {
    if user.has_used_referral {
        return Err(ALREADY_USED);
    }
    match referrer {
        None => Err(UNKNOWN_CODE),
        Some(referrer) if referrer.id == user.id => Err(OWN_CODE),
        Some(_) => Ok(()),
    }
}

pub async fn apply_referral_code(pool: &PgPool, user_id: Uuid, code: &str) -> Result<ActionResponse, Error> {
    let code = normalize_code(code);
    if validate_referral_code(&code).is_err() {
        return Ok(ActionResponse::failed(INVALID_REFERRAL_CODE_ERROR));
    }

    let mut tx = pool.begin().await?;

    let user = fetch_user_for_update(&mut *tx, user_id).await?;
    let referrer = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE referral_code = $1 FOR UPDATE",
        USER_COLUMNS
    ))
    .bind(&code)
    .fetch_optional(&mut *tx)
    .await?;

    if let Err(message) = check_referral(&user, referrer.as_ref()) {
        tx.rollback().await?;
        return Ok(ActionResponse::failed(message));
    }
    let Some(referrer) = referrer else {
        return Ok(ActionResponse::failed(UNKNOWN_CODE));
    };

    sqlx::query("UPDATE users SET has_used_referral = TRUE, referred_by = $2 WHERE id = $1")
        .bind(user_id)
        .bind(&code)
        .execute(&mut *tx)
        .await?;

    let user = add_points(&mut *tx, user_id, REFERRAL_BONUS).await?;
    add_points(&mut *tx, referrer.id, REFERRAL_BONUS).await?;

    tx.commit().await?;

    info!(
        "🤝 REFERRAL: {} redeemed {}'s code, both earned {} points",
        user.name, referrer.name, REFERRAL_BONUS
    );

    Ok(ActionResponse::ok(
        format!("Referral code applied! You earned {} bonus points.", REFERRAL_BONUS),
        user.into_profile(),
    ))
}

pub async fn apply_referral_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<ReferralRequest>,
) -> Result<Json<ActionResponse>, Error> {
    rate_limit::enforce(&state.redis, RateLimitType::Referral, &user_id.0.to_string()).await?;
    Ok(Json(apply_referral_code(&state.pool, user_id.0, &request.code).await?))
}
