use chrono::NaiveDate;
use shared::ledger::{can_spin, record_spin, DailySpinRecord};
use shared::models::UserProfile;
use shared::reward_flow::Resolution;
use sqlx::{PgExecutor, PgPool};
use std::future::Future;
use tracing::info;
use uuid::Uuid;

use super::user_service::{fetch_user_for_update, UserRow, USER_COLUMNS};
use crate::error::Error;

/// Adds `amount` (possibly zero or negative) to the balance and returns the new row.
pub async fn add_points<'e>(executor: impl PgExecutor<'e>, user_id: Uuid, amount: i64) -> Result<UserRow, Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET points = points + $2 WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(amount)
    .fetch_optional(executor)
    .await?
    .ok_or(Error::NotFound("User"))
}

/// Where the wheel counts spins and pays resolutions.
pub trait SpinLedger: Send + Sync {
    /// Counts one spin for `today` unless the daily cap is already spent.
    /// Returns `None` when the cap held.
    fn count_spin(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> impl Future<Output = Result<Option<DailySpinRecord>, Error>> + Send;

    /// Applies the credit of a resolution, including a credit of zero.
    fn credit(
        &self,
        user_id: Uuid,
        resolution: &Resolution,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send;
}

impl SpinLedger for PgPool {
    async fn count_spin(&self, user_id: Uuid, today: NaiveDate) -> Result<Option<DailySpinRecord>, Error> {
        let mut tx = self.begin().await?;

        // The row lock serialises concurrent spins of the same user.
        let user = fetch_user_for_update(&mut *tx, user_id).await?;
        let record = user.spin_record();
        if !can_spin(&record, today) {
            tx.rollback().await?;
            return Ok(None);
        }

        let next = record_spin(&record, today);
        sqlx::query("UPDATE users SET daily_spins = $2, last_spin_date = $3 WHERE id = $1")
            .bind(user_id)
            .bind(i32::try_from(next.spins_used).unwrap_or(i32::MAX))
            .bind(next.stored_date())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(next))
    }

    async fn credit(&self, user_id: Uuid, resolution: &Resolution) -> Result<UserProfile, Error> {
        let user = add_points(self, user_id, resolution.credit).await?;

        info!(
            "🎡 WHEEL: User {} {} {} points (balance {})",
            user.name,
            if resolution.awarded { "claimed" } else { "forfeited the ad for" },
            resolution.credit,
            user.points
        );

        Ok(user.into_profile())
    }
}
