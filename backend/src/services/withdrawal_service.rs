use axum::{extract::{Extension, State}, Json};
use shared::models::{
    find_tier, ActionResponse, CreateWithdrawalRequest, WithdrawalMethod, WithdrawalRequest, WithdrawalStatus,
    WithdrawalTier, WITHDRAWAL_TIERS,
};
use shared::rate_limit::RateLimitType;
use shared::validation::WithdrawalForm;
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::points_service::add_points;
use super::user_service::{fetch_user_for_update, UserRow, USER_COLUMNS};
use crate::auth::middleware::UserId;
use crate::error::Error;
use crate::{rate_limit, AppState};

pub const UNKNOWN_TIER: &str = "Please choose a valid withdrawal amount.";
pub const INSUFFICIENT_POINTS: &str = "You do not have enough points for this withdrawal.";
pub const SUBMITTED: &str = "Withdrawal request submitted successfully!";

#[derive(Debug, sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: Uuid,
    amount: i32,
    points: i64,
    method: String,
    status: String,
    request_time: String,
    user_name: String,
    user_email: String,
    user_mobile: String,
}

fn decode_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
    Error::Database(sqlx::Error::Decode(Box::new(e)))
}

impl WithdrawalRow {
    fn into_request(self) -> Result<WithdrawalRequest, Error> {
        Ok(WithdrawalRequest {
            id: self.id.to_string(),
            user_id: self.user_id.to_string(),
            amount: self.amount,
            points: self.points,
            method: WithdrawalMethod::from_str(&self.method).map_err(decode_error)?,
            status: WithdrawalStatus::from_str(&self.status).map_err(decode_error)?,
            request_time: self.request_time,
            user_name: self.user_name,
            user_email: self.user_email,
            user_mobile: self.user_mobile,
        })
    }
}

pub async fn create_withdrawal_request(
    pool: &PgPool,
    user_id: Uuid,
    request: &CreateWithdrawalRequest,
) -> Result<ActionResponse, Error> {
    let form = WithdrawalForm {
        name: request.name.trim(),
        email: request.email.trim(),
        mobile: request.mobile.trim(),
    };
    if let Err(message) = form.validate() {
        return Ok(ActionResponse::failed(message));
    }
    let Some(tier) = find_tier(request.tier_id) else {
        return Ok(ActionResponse::failed(UNKNOWN_TIER));
    };

    let mut tx = pool.begin().await?;

    let balance = fetch_user_for_update(&mut *tx, user_id).await?.into_profile();
    if !balance.can_afford(&tier) {
        tx.rollback().await?;
        return Ok(ActionResponse::failed(INSUFFICIENT_POINTS));
    }

    add_points(&mut *tx, user_id, -tier.points).await?;

    let request_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO withdrawal_requests (id, user_id, amount, points, method, status, user_name, user_email, user_mobile)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(request_id)
    .bind(user_id)
    .bind(tier.rs)
    .bind(tier.points)
    .bind(request.method.to_string())
    .bind(WithdrawalStatus::Pending.to_string())
    .bind(form.name)
    .bind(form.email)
    .bind(form.mobile)
    .execute(&mut *tx)
    .await?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET withdrawal_name = $2, withdrawal_mobile = $3 WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(form.name)
    .bind(form.mobile)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "💸 WITHDRAWAL: {} requested Rs {} via {} for {} points (request {})",
        user.name, tier.rs, request.method, tier.points, request_id
    );

    Ok(ActionResponse::ok(SUBMITTED, user.into_profile()))
}

pub async fn list_withdrawal_requests(pool: &PgPool, user_id: Uuid) -> Result<Vec<WithdrawalRequest>, Error> {
    let rows = sqlx::query_as::<_, WithdrawalRow>(
        r#"
        SELECT id, user_id, amount, points, method, status,
               TO_CHAR(request_time AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS request_time,
               user_name, user_email, user_mobile
        FROM withdrawal_requests
        WHERE user_id = $1
        ORDER BY withdrawal_requests.request_time DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(WithdrawalRow::into_request).collect()
}

pub async fn get_tiers() -> Json<Vec<WithdrawalTier>> {
    Json(WITHDRAWAL_TIERS.to_vec())
}

pub async fn list_withdrawals_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Vec<WithdrawalRequest>>, Error> {
    Ok(Json(list_withdrawal_requests(&state.pool, user_id.0).await?))
}

pub async fn create_withdrawal_handler(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<Json<ActionResponse>, Error> {
    rate_limit::enforce(&state.redis, RateLimitType::Withdrawal, &user_id.0.to_string()).await?;
    Ok(Json(create_withdrawal_request(&state.pool, user_id.0, &request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(method: &str, status: &str) -> WithdrawalRow {
        WithdrawalRow {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            amount: 10,
            points: 1000,
            method: method.to_string(),
            status: status.to_string(),
            request_time: "2024-05-01T10:00:00Z".to_string(),
            user_name: "Ravi".to_string(),
            user_email: "ravi@gmail.com".to_string(),
            user_mobile: "9876543210".to_string(),
        }
    }

    #[test]
    fn test_row_decodes_stored_text() {
        let request = row("Google Play", "Pending").into_request().unwrap();
        assert_eq!(request.method, WithdrawalMethod::GooglePlay);
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert_eq!(request.request_time, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_row_rejects_unknown_method() {
        assert!(matches!(
            row("Paypal", "Pending").into_request(),
            Err(Error::Database(sqlx::Error::Decode(_)))
        ));
    }

    // Rejections that need no database run before the transaction opens.
    #[tokio::test]
    async fn test_invalid_requests_fail_before_touching_the_pool() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let mut request = CreateWithdrawalRequest {
            tier_id: 1,
            method: WithdrawalMethod::Upi,
            name: "R".to_string(),
            email: "ravi@gmail.com".to_string(),
            mobile: "9876543210".to_string(),
        };

        let response = create_withdrawal_request(&pool, Uuid::nil(), &request).await.unwrap();
        assert!(!response.success);

        request.name = "Ravi".to_string();
        request.tier_id = 42;
        let response = create_withdrawal_request(&pool, Uuid::nil(), &request).await.unwrap();
        assert_eq!(response, ActionResponse::failed(UNKNOWN_TIER));
    }
}
