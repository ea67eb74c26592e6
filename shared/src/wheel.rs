use rand::Rng;
use serde::{Serialize, Deserialize};
use std::time::Duration;

/// One equal-arc segment of the reward wheel.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub value: u32,
}

pub const SLICE_COUNT: usize = 8;
pub const SLICE_ANGLE: f64 = 360.0 / SLICE_COUNT as f64;

/// Slice values in wheel order, starting at 0° and running clockwise.
pub const SLICES: [Slice; SLICE_COUNT] = [
    Slice { value: 10 },
    Slice { value: 200 },
    Slice { value: 25 },
    Slice { value: 0 },
    Slice { value: 50 },
    Slice { value: 150 },
    Slice { value: 100 },
    Slice { value: 40 },
];

/// Full turns added on every spin before the random offset.
pub const SPINS_PER_TURN: u32 = 10;
/// Where the pointer sits, measured from the wheel's 0° origin.
pub const POINTER_ANGLE: f64 = 180.0;
/// Length of the spin animation; the outcome is read once it elapses.
pub const SETTLE_DURATION: Duration = Duration::from_secs(5);

/// Rotation bookkeeping for one wheel. Lives only as long as the session.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SpinState {
    pub rotation: f64,
    pub is_spinning: bool,
}

/// Where a spin will come to rest and what it pays.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SpinTarget {
    pub target_rotation: f64,
    pub slice_index: usize,
    pub won_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinError {
    AlreadySpinning,
}

impl std::fmt::Display for SpinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySpinning => write!(f, "The wheel is already spinning"),
        }
    }
}

impl std::error::Error for SpinError {}

/// Next resting rotation: round up to a whole turn, add the fixed turns, then the offset.
pub fn target_rotation(current: f64, offset: f64) -> f64 {
    (current / 360.0).ceil() * 360.0 + f64::from(SPINS_PER_TURN) * 360.0 + offset
}

/// Index of the slice under the pointer for a given total rotation.
pub fn slice_index(rotation: f64) -> usize {
    let final_angle = rotation.rem_euclid(360.0);
    let winning_angle = (POINTER_ANGLE - final_angle + 360.0).rem_euclid(360.0);
    let index = (winning_angle / SLICE_ANGLE).floor() as usize;
    index.min(SLICE_COUNT - 1)
}

pub fn slice_value(rotation: f64) -> u32 {
    SLICES[slice_index(rotation)].value
}

impl SpinState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spins with an explicit offset in `[0, 360)`.
    pub fn spin_with(&mut self, offset: f64) -> Result<SpinTarget, SpinError> {
        if self.is_spinning {
            return Err(SpinError::AlreadySpinning);
        }

        let target = target_rotation(self.rotation, offset);
        let index = slice_index(target);
        self.rotation = target;
        self.is_spinning = true;

        log::debug!("wheel spin to {:.2}° lands on slice {}", target, index);

        Ok(SpinTarget {
            target_rotation: target,
            slice_index: index,
            won_value: SLICES[index].value,
        })
    }

    /// Spins with a fresh uniform draw from `rng`.
    pub fn spin<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<SpinTarget, SpinError> {
        let offset = rng.gen_range(0.0..360.0);
        self.spin_with(offset)
    }

    /// Called once the settle delay has elapsed.
    pub fn settle(&mut self) {
        self.is_spinning = false;
    }
}
