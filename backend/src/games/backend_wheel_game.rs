use axum::{
    extract::{Extension, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use shared::ledger::{effective_spins_used, spins_left, today_utc, DailySpinRecord, DAILY_SPIN_LIMIT};
use shared::models::{WheelResolveResponse, WheelSpinResponse};
use shared::reward_flow::Resolution;
use shared::wheel::SETTLE_DURATION;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::middleware::UserId;
use crate::error::Error;
use crate::services::points_service::SpinLedger;
use crate::services::user_service;
use crate::services::wheel_sessions::{WheelSessions, WheelSnapshot};
use crate::AppState;

/// Mounted under the authenticated routes.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wheel).delete(close_wheel))
        .route("/spin", post(spin_wheel))
        .route("/skip", post(skip_ad))
        .route("/claim", post(claim_reward))
}

#[derive(Debug, Serialize)]
pub struct WheelStatus {
    #[serde(flatten)]
    pub wheel: WheelSnapshot,
    pub spins_used_today: u32,
    pub spins_left: u32,
    pub daily_limit: u32,
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub closed: bool,
    pub resolution: Option<WheelResolveResponse>,
}

/// Starts a spin and counts it. The target is only handed out once the
/// ledger accepted the spin.
pub async fn begin_spin<L: SpinLedger>(
    ledger: &L,
    wheels: &WheelSessions,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<WheelSpinResponse, Error> {
    // A spinning session keeps this user's next spin out until the count lands.
    let target = wheels.start_spin(user_id).await?;

    let counted = match ledger.count_spin(user_id, today).await {
        Ok(counted) => counted,
        Err(e) => {
            wheels.abort_spin(user_id).await;
            return Err(e);
        }
    };
    let Some(record) = counted else {
        wheels.abort_spin(user_id).await;
        info!("🎡 WHEEL: User {} hit the daily limit of {} spins", user_id, DAILY_SPIN_LIMIT);
        return Ok(WheelSpinResponse::limit_reached());
    };

    Ok(WheelSpinResponse {
        success: true,
        target_rotation: Some(target.target_rotation),
        settle_ms: SETTLE_DURATION.as_millis() as u64,
        spins_left: spins_left(&record, today),
        notice: None,
    })
}

pub async fn settle_resolution<L: SpinLedger>(
    ledger: &L,
    user_id: Uuid,
    resolution: Resolution,
    today: NaiveDate,
) -> Result<WheelResolveResponse, Error> {
    let user = ledger.credit(user_id, &resolution).await?;
    let record = DailySpinRecord::from_stored(user.last_spin_date.as_deref(), user.daily_spins);

    Ok(WheelResolveResponse {
        awarded: resolution.awarded,
        credited: resolution.credit,
        notice: resolution.notice,
        new_balance: user.points,
        spins_left: spins_left(&record, today),
        user,
    })
}

pub async fn close_session<L: SpinLedger>(
    ledger: &L,
    wheels: &WheelSessions,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<CloseResponse, Error> {
    let resolution = match wheels.close(user_id).await? {
        Some(forfeited) => {
            warn!("🎡 WHEEL: User {} closed the wheel before claiming", user_id);
            Some(settle_resolution(ledger, user_id, forfeited, today).await?)
        }
        None => None,
    };

    Ok(CloseResponse {
        closed: true,
        resolution,
    })
}

async fn get_wheel(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<WheelStatus>, Error> {
    let user = user_service::fetch_user(&state.pool, user_id.0).await?;
    let record = user.spin_record();
    let today = today_utc();

    Ok(Json(WheelStatus {
        wheel: state.wheels.snapshot(user_id.0).await,
        spins_used_today: effective_spins_used(&record, today),
        spins_left: spins_left(&record, today),
        daily_limit: DAILY_SPIN_LIMIT,
        points: user.points,
    }))
}

async fn spin_wheel(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<WheelSpinResponse>, Error> {
    Ok(Json(begin_spin(&state.pool, &state.wheels, user_id.0, today_utc()).await?))
}

async fn skip_ad(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<WheelResolveResponse>, Error> {
    let resolution = state.wheels.skip(user_id.0).await?;
    Ok(Json(settle_resolution(&state.pool, user_id.0, resolution, today_utc()).await?))
}

async fn claim_reward(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<WheelResolveResponse>, Error> {
    let resolution = state.wheels.claim(user_id.0).await?;
    Ok(Json(settle_resolution(&state.pool, user_id.0, resolution, today_utc()).await?))
}

async fn close_wheel(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<CloseResponse>, Error> {
    Ok(Json(close_session(&state.pool, &state.wheels, user_id.0, today_utc()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ledger::{can_spin, record_spin};
    use shared::models::{UserProfile, WithdrawalInfo};
    use shared::reward_flow::{AdPhase, AD_COMPLETE, AD_TICK};
    use shared::wheel::slice_value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const MARGIN: Duration = Duration::from_millis(50);

    /// Keeps balances and spin records in memory and remembers every credit.
    #[derive(Default)]
    struct MemoryLedger {
        users: Mutex<HashMap<Uuid, (DailySpinRecord, i64)>>,
        credits: Mutex<Vec<i64>>,
    }

    impl MemoryLedger {
        fn with_user(user_id: Uuid, record: DailySpinRecord, points: i64) -> Self {
            let ledger = Self::default();
            ledger.users.lock().unwrap().insert(user_id, (record, points));
            ledger
        }

        fn record(&self, user_id: Uuid) -> DailySpinRecord {
            self.users.lock().unwrap()[&user_id].0
        }

        fn points(&self, user_id: Uuid) -> i64 {
            self.users.lock().unwrap()[&user_id].1
        }

        fn credits(&self) -> Vec<i64> {
            self.credits.lock().unwrap().clone()
        }
    }

    impl SpinLedger for MemoryLedger {
        async fn count_spin(&self, user_id: Uuid, today: NaiveDate) -> Result<Option<DailySpinRecord>, Error> {
            let mut users = self.users.lock().unwrap();
            let (record, _) = users.get_mut(&user_id).ok_or(Error::NotFound("User"))?;
            if !can_spin(record, today) {
                return Ok(None);
            }
            *record = record_spin(record, today);
            Ok(Some(*record))
        }

        async fn credit(&self, user_id: Uuid, resolution: &Resolution) -> Result<UserProfile, Error> {
            let mut users = self.users.lock().unwrap();
            let (record, points) = users.get_mut(&user_id).ok_or(Error::NotFound("User"))?;
            *points += resolution.credit;
            self.credits.lock().unwrap().push(resolution.credit);

            Ok(UserProfile {
                id: user_id.to_string(),
                name: "Asha".to_string(),
                email: "asha@gmail.com".to_string(),
                avatar_url: String::new(),
                points: *points,
                referral_code: "ASHA2345".to_string(),
                has_used_referral: false,
                referred_by: None,
                withdrawal_info: WithdrawalInfo::default(),
                daily_spins: record.spins_used as i32,
                last_spin_date: record.stored_date(),
            })
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn setup(spins_used: u32) -> (MemoryLedger, WheelSessions, Uuid) {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, DailySpinRecord::new(Some(today()), spins_used), 500);
        (ledger, WheelSessions::new(), user)
    }

    #[tokio::test(start_paused = true)]
    async fn test_spin_is_counted_when_it_starts() {
        let (ledger, wheels, user) = setup(0);

        let response = begin_spin(&ledger, &wheels, user, today()).await.unwrap();
        assert!(response.success);
        assert!(response.target_rotation.is_some());
        assert_eq!(response.spins_left, DAILY_SPIN_LIMIT - 1);
        assert_eq!(ledger.record(user).spins_used, 1);
        assert!(ledger.credits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_credits_zero_and_counts_once() {
        let (ledger, wheels, user) = setup(0);
        begin_spin(&ledger, &wheels, user, today()).await.unwrap();

        tokio::time::sleep(SETTLE_DURATION + AD_TICK * 10 + MARGIN).await;
        let resolution = wheels.skip(user).await.unwrap();
        let response = settle_resolution(&ledger, user, resolution, today()).await.unwrap();

        assert!(!response.awarded);
        assert_eq!(response.credited, 0);
        assert_eq!(response.new_balance, 500);
        assert_eq!(response.spins_left, DAILY_SPIN_LIMIT - 1);
        assert_eq!(ledger.credits(), vec![0]);
        assert_eq!(ledger.record(user).spins_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_credits_won_value() {
        let (ledger, wheels, user) = setup(0);
        let spin = begin_spin(&ledger, &wheels, user, today()).await.unwrap();
        let won = i64::from(slice_value(spin.target_rotation.unwrap()));

        tokio::time::sleep(SETTLE_DURATION + AD_TICK * u32::from(AD_COMPLETE / 2) + MARGIN).await;
        let resolution = wheels.claim(user).await.unwrap();
        let response = settle_resolution(&ledger, user, resolution, today()).await.unwrap();

        assert_eq!(response.credited, won);
        assert_eq!(response.new_balance, 500 + won);
        assert_eq!(ledger.credits(), vec![won]);
        assert_eq!(ledger.points(user), 500 + won);
        assert_eq!(ledger.record(user).spins_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mid_spin_forfeits() {
        let (ledger, wheels, user) = setup(0);
        begin_spin(&ledger, &wheels, user, today()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let closed = close_session(&ledger, &wheels, user, today()).await.unwrap();
        let resolution = closed.resolution.unwrap();

        assert_eq!(resolution.credited, 0);
        assert_eq!(ledger.credits(), vec![0]);
        assert_eq!(ledger.record(user).spins_used, 1);
        assert_eq!(wheels.snapshot(user).await.ad, AdPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_when_idle_credits_nothing() {
        let (ledger, wheels, user) = setup(0);
        let closed = close_session(&ledger, &wheels, user, today()).await.unwrap();
        assert!(closed.closed);
        assert!(closed.resolution.is_none());
        assert!(ledger.credits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_holds_right_after_a_resolution() {
        let (ledger, wheels, user) = setup(DAILY_SPIN_LIMIT - 1);
        let last = begin_spin(&ledger, &wheels, user, today()).await.unwrap();
        assert!(last.success);
        assert_eq!(last.spins_left, 0);

        tokio::time::sleep(SETTLE_DURATION + MARGIN).await;
        let _ = wheels.skip(user).await.unwrap();

        // The session is free again before the credit is written.
        let over = begin_spin(&ledger, &wheels, user, today()).await.unwrap();
        assert_eq!(over, WheelSpinResponse::limit_reached());
        assert_eq!(ledger.record(user).spins_used, DAILY_SPIN_LIMIT);
        assert!(!wheels.snapshot(user).await.is_spinning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_failure_releases_the_wheel() {
        let ledger = MemoryLedger::default();
        let wheels = WheelSessions::new();
        let user = Uuid::new_v4();

        assert!(matches!(
            begin_spin(&ledger, &wheels, user, today()).await,
            Err(Error::NotFound(_))
        ));
        assert!(!wheels.snapshot(user).await.is_spinning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_day_resets_the_count() {
        let user = Uuid::new_v4();
        let yesterday = today().pred_opt().unwrap();
        let ledger = MemoryLedger::with_user(user, DailySpinRecord::new(Some(yesterday), DAILY_SPIN_LIMIT), 0);
        let wheels = WheelSessions::new();

        let response = begin_spin(&ledger, &wheels, user, today()).await.unwrap();
        assert!(response.success);
        assert_eq!(ledger.record(user), DailySpinRecord::new(Some(today()), 1));
    }
}
