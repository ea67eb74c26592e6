//! Gate between a wheel outcome and crediting it: a simulated rewarded ad has
//! to play to completion and be claimed before the won points are paid out.

use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::notice::Notice;

pub const AD_TICK: Duration = Duration::from_millis(100);
pub const AD_TICK_INCREMENT: u8 = 2;
pub const AD_COMPLETE: u8 = 100;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AdPhase {
    #[default]
    Idle,
    AdPlaying { progress: u8 },
    Resolved { awarded: bool },
}

/// Value won by the last spin, held until the ad resolves.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PendingOutcome {
    pub won_value: u32,
}

/// Result of resolving the ad. `credit` must be applied to the balance
/// exactly once, including when it is zero.
#[must_use]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub awarded: bool,
    pub credit: i64,
    pub notice: Notice,
}

impl Resolution {
    /// Outcome of walking away before the reward could be claimed.
    pub fn forfeited() -> Self {
        Self {
            awarded: false,
            credit: 0,
            notice: Notice::ad_skipped(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    Busy,
    NotPlaying,
    AdStillPlaying,
    AdFinished,
}

impl std::fmt::Display for FlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "A reward is already waiting to be claimed"),
            Self::NotPlaying => write!(f, "No reward ad is playing"),
            Self::AdStillPlaying => write!(f, "The ad has not finished yet"),
            Self::AdFinished => write!(f, "The ad has finished; claim your reward"),
        }
    }
}

impl std::error::Error for FlowError {}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RewardFlow {
    pub phase: AdPhase,
    pub pending: Option<PendingOutcome>,
}

impl RewardFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, AdPhase::AdPlaying { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self.phase {
            AdPhase::AdPlaying { progress } => Some(progress),
            _ => None,
        }
    }

    /// Opens the ad for a freshly won value.
    pub fn begin(&mut self, won_value: u32) -> Result<(), FlowError> {
        if self.is_active() {
            return Err(FlowError::Busy);
        }
        self.phase = AdPhase::AdPlaying { progress: 0 };
        self.pending = Some(PendingOutcome { won_value });
        Ok(())
    }

    /// Advances the ad by one tick. Returns false once the ticker should stop.
    pub fn tick(&mut self) -> bool {
        match &mut self.phase {
            AdPhase::AdPlaying { progress } if *progress < AD_COMPLETE => {
                *progress = progress.saturating_add(AD_TICK_INCREMENT).min(AD_COMPLETE);
                *progress < AD_COMPLETE
            }
            _ => false,
        }
    }

    /// Abandons the ad before it finishes. Pays nothing.
    pub fn cancel(&mut self) -> Result<Resolution, FlowError> {
        match self.phase {
            AdPhase::AdPlaying { progress } if progress < AD_COMPLETE => {
                self.phase = AdPhase::Resolved { awarded: false };
                self.pending = None;
                Ok(Resolution::forfeited())
            }
            AdPhase::AdPlaying { .. } => Err(FlowError::AdFinished),
            _ => Err(FlowError::NotPlaying),
        }
    }

    /// Claims the pending value once the ad has finished.
    pub fn claim(&mut self) -> Result<Resolution, FlowError> {
        match self.phase {
            AdPhase::AdPlaying { progress } if progress >= AD_COMPLETE => {
                let won_value = self.pending.take().map(|p| p.won_value).unwrap_or(0);
                self.phase = AdPhase::Resolved { awarded: true };
                let notice = if won_value > 0 {
                    Notice::points_awarded(won_value)
                } else {
                    Notice::better_luck()
                };
                Ok(Resolution {
                    awarded: true,
                    credit: i64::from(won_value),
                    notice,
                })
            }
            AdPhase::AdPlaying { .. } => Err(FlowError::AdStillPlaying),
            _ => Err(FlowError::NotPlaying),
        }
    }

    /// Closes the dialog; nothing carries over to the next cycle.
    pub fn reset(&mut self) {
        self.phase = AdPhase::Idle;
        self.pending = None;
    }
}
