use axum::{extract::{State, Extension}, Json};
use rand::Rng;
use shared::constants::REFERRAL_CODE_LENGTH;
use shared::ledger::DailySpinRecord;
use shared::models::{UpdateProfileRequest, UserProfile, WithdrawalInfo};
use shared::validation::ProfileForm;
use sqlx::{PgExecutor, PgPool};
use tracing::{error, info, trace};
use uuid::Uuid;

use crate::auth::google::GoogleIdentity;
use crate::auth::middleware::UserId;
use crate::error::Error;
use crate::AppState;

const REFERRAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERRAL_CODE_ATTEMPTS: usize = 5;

pub const USER_COLUMNS: &str = "id, email, name, avatar_url, points, referral_code, has_used_referral, \
    referred_by, withdrawal_name, withdrawal_mobile, daily_spins, last_spin_date";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: String,
    pub points: i64,
    pub referral_code: String,
    pub has_used_referral: bool,
    pub referred_by: Option<String>,
    pub withdrawal_name: String,
    pub withdrawal_mobile: String,
    pub daily_spins: i32,
    pub last_spin_date: Option<String>,
}

impl UserRow {
    pub fn spin_record(&self) -> DailySpinRecord {
        DailySpinRecord::from_stored(self.last_spin_date.as_deref(), self.daily_spins)
    }

    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id.to_string(),
            name: self.name,
            email: self.email,
            avatar_url: self.avatar_url,
            points: self.points,
            referral_code: self.referral_code,
            has_used_referral: self.has_used_referral,
            referred_by: self.referred_by,
            withdrawal_info: WithdrawalInfo {
                name: self.withdrawal_name,
                mobile: self.withdrawal_mobile,
            },
            daily_spins: self.daily_spins,
            last_spin_date: self.last_spin_date,
        }
    }
}

pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LENGTH)
        .map(|_| REFERRAL_CODE_ALPHABET[rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())] as char)
        .collect()
}

pub async fn fetch_user<'e>(executor: impl PgExecutor<'e>, user_id: Uuid) -> Result<UserRow, Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(Error::NotFound("User"))
}

/// Same as `fetch_user` but holds the row lock until the transaction ends.
pub async fn fetch_user_for_update<'e>(executor: impl PgExecutor<'e>, user_id: Uuid) -> Result<UserRow, Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(Error::NotFound("User"))
}

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<UserProfile, Error> {
    trace!("Fetching profile for user ID: {}", user_id);
    Ok(fetch_user(pool, user_id).await?.into_profile())
}

/// Finds the account for a Google identity, creating it on first sign-in.
pub async fn upsert_google_user(pool: &PgPool, identity: &GoogleIdentity) -> Result<(Uuid, UserProfile), Error> {
    let existing = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET avatar_url = $2, email = $3, name = $4, last_login = NOW() WHERE google_sub = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&identity.subject)
    .bind(&identity.avatar_url)
    .bind(&identity.email)
    .bind(&identity.name)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = existing {
        return Ok((user.id, user.into_profile()));
    }

    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let user_id = Uuid::new_v4();
        let referral_code = generate_referral_code();

        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, google_sub, email, name, avatar_url, referral_code, withdrawal_name, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $4, NOW())
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&identity.subject)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.avatar_url)
        .bind(&referral_code)
        .fetch_one(pool)
        .await;

        match inserted {
            Ok(user) => {
                info!("👤 New user {} joined with referral code {}", user.name, user.referral_code);
                return Ok((user.id, user.into_profile()));
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // Either the referral code collided or a parallel sign-in created the user.
                if let Some(user) = sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {} FROM users WHERE google_sub = $1",
                    USER_COLUMNS
                ))
                .bind(&identity.subject)
                .fetch_optional(pool)
                .await?
                {
                    return Ok((user.id, user.into_profile()));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    error!("Could not allocate a unique referral code for {}", identity.email);
    Err(Error::Conflict("Could not create account, please try again".to_string()))
}

pub async fn update_profile(pool: &PgPool, user_id: Uuid, name: &str, mobile: &str) -> Result<UserProfile, Error> {
    ProfileForm { name, mobile }
        .validate()
        .map_err(|msg| Error::BadRequest(msg.to_string()))?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET withdrawal_name = $2, withdrawal_mobile = $3 WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(name.trim())
    .bind(mobile.trim())
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound("User"))?;

    Ok(user.into_profile())
}

pub async fn get_profile_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<UserProfile>, Error> {
    Ok(Json(get_profile(&state.pool, user_id.0).await?))
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, Error> {
    let profile = update_profile(&state.pool, user_id.0, &request.name, &request.mobile).await?;
    info!("Profile updated for user {}", user_id.0);
    Ok(Json(profile))
}
