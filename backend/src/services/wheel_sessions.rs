use serde::Serialize;
use shared::reward_flow::{AdPhase, FlowError, Resolution, RewardFlow, AD_TICK};
use shared::wheel::{SpinError, SpinState, SpinTarget, SETTLE_DURATION};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::Error;

/// Background task that is aborted when its handle goes away.
struct TaskGuard(Option<JoinHandle<()>>);

impl TaskGuard {
    fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    /// Lets the task run to completion. Used by a task releasing its own guard.
    fn release(mut self) {
        self.0.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

struct WheelSession {
    spin: SpinState,
    flow: RewardFlow,
    // Outcome of the running spin, hidden until the wheel settles.
    landing: Option<u32>,
    settle: Option<TaskGuard>,
    ticker: Option<TaskGuard>,
    last_seen: Instant,
}

impl WheelSession {
    fn new() -> Self {
        Self {
            spin: SpinState::new(),
            flow: RewardFlow::new(),
            landing: None,
            settle: None,
            ticker: None,
            last_seen: Instant::now(),
        }
    }

    fn is_busy(&self) -> bool {
        self.spin.is_spinning || self.flow.is_active()
    }

    fn snapshot(&self) -> WheelSnapshot {
        WheelSnapshot {
            rotation: self.spin.rotation,
            is_spinning: self.spin.is_spinning,
            ad: self.flow.phase,
            pending_value: self.flow.pending.map(|p| p.won_value),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct WheelSnapshot {
    pub rotation: f64,
    pub is_spinning: bool,
    pub ad: AdPhase,
    pub pending_value: Option<u32>,
}

impl Default for WheelSnapshot {
    fn default() -> Self {
        WheelSession::new().snapshot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Spin(SpinError),
    Flow(FlowError),
    NoSession,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spin(e) => write!(f, "{}", e),
            Self::Flow(e) => write!(f, "{}", e),
            Self::NoSession => write!(f, "Spin the wheel first"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SpinError> for SessionError {
    fn from(err: SpinError) -> Self {
        Self::Spin(err)
    }
}

impl From<FlowError> for SessionError {
    fn from(err: FlowError) -> Self {
        Self::Flow(err)
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        Error::Conflict(err.to_string())
    }
}

/// Per-user wheel and ad state, driven by timers on the runtime.
#[derive(Clone)]
pub struct WheelSessions {
    sessions: Arc<Mutex<HashMap<Uuid, WheelSession>>>,
    settle_after: Duration,
    tick_every: Duration,
}

impl Default for WheelSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelSessions {
    pub fn new() -> Self {
        Self::with_timing(SETTLE_DURATION, AD_TICK)
    }

    pub fn with_timing(settle_after: Duration, tick_every: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            settle_after,
            tick_every,
        }
    }

    /// Starts a spin. The caller counts it against the daily ledger and
    /// calls [`WheelSessions::abort_spin`] if the ledger refuses.
    pub async fn start_spin(&self, user_id: Uuid) -> Result<SpinTarget, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_insert_with(WheelSession::new);
        session.last_seen = Instant::now();

        if session.flow.is_active() {
            return Err(FlowError::Busy.into());
        }
        let target = session.spin.spin(&mut rand::thread_rng())?;

        session.flow.reset();
        session.landing = Some(target.won_value);
        session.settle = Some(self.spawn_settle(user_id));

        debug!("Wheel spin started for {} toward {:.2}°", user_id, target.target_rotation);
        Ok(target)
    }

    /// Drops a spin whose target was never handed out. Produces no resolution.
    pub async fn abort_spin(&self, user_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&user_id) {
            session.settle = None;
            session.ticker = None;
            session.landing = None;
            session.spin.settle();
            session.flow.reset();
            debug!("Wheel spin aborted for {}", user_id);
        }
    }

    fn spawn_settle(&self, user_id: Uuid) -> TaskGuard {
        let this = self.clone();
        TaskGuard::new(tokio::spawn(async move {
            tokio::time::sleep(this.settle_after).await;
            this.settle(user_id).await;
        }))
    }

    async fn settle(&self, user_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&user_id) else {
            return;
        };

        if let Some(guard) = session.settle.take() {
            guard.release();
        }
        session.spin.settle();

        if let Some(won_value) = session.landing.take() {
            if session.flow.begin(won_value).is_ok() {
                session.ticker = Some(self.spawn_ticker(user_id));
                trace!("Wheel settled for {}, reward ad started", user_id);
            }
        }
    }

    fn spawn_ticker(&self, user_id: Uuid) -> TaskGuard {
        let this = self.clone();
        TaskGuard::new(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + this.tick_every, this.tick_every);
            loop {
                interval.tick().await;
                let mut sessions = this.sessions.lock().await;
                let Some(session) = sessions.get_mut(&user_id) else {
                    break;
                };
                if !session.flow.tick() {
                    if let Some(guard) = session.ticker.take() {
                        guard.release();
                    }
                    break;
                }
            }
        }))
    }

    pub async fn snapshot(&self, user_id: Uuid) -> WheelSnapshot {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&user_id)
            .map(WheelSession::snapshot)
            .unwrap_or_default()
    }

    /// Skips the ad before it finishes; the spin still counts.
    pub async fn skip(&self, user_id: Uuid) -> Result<Resolution, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user_id).ok_or(SessionError::NoSession)?;
        session.last_seen = Instant::now();

        let resolution = session.flow.cancel()?;
        session.ticker = None;
        Ok(resolution)
    }

    pub async fn claim(&self, user_id: Uuid) -> Result<Resolution, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user_id).ok_or(SessionError::NoSession)?;
        session.last_seen = Instant::now();

        let resolution = session.flow.claim()?;
        session.ticker = None;
        Ok(resolution)
    }

    /// Closes the dialog. Returns a resolution when the close forfeits a
    /// spin that was still in flight.
    pub async fn close(&self, user_id: Uuid) -> Result<Option<Resolution>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&user_id) else {
            return Ok(None);
        };
        session.last_seen = Instant::now();

        if session.spin.is_spinning {
            session.settle = None;
            session.landing = None;
            session.spin.settle();
            session.flow.reset();
            return Ok(Some(Resolution::forfeited()));
        }

        if session.flow.is_active() {
            let resolution = session.flow.cancel()?;
            session.ticker = None;
            session.flow.reset();
            return Ok(Some(resolution));
        }

        session.flow.reset();
        Ok(None)
    }

    /// Drops sessions with nothing in flight that have sat untouched for `max_idle`.
    pub async fn cleanup_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, session| session.is_busy() || now.duration_since(session.last_seen) < max_idle);
        before - sessions.len()
    }
}
