//! Behavior inputs and per-subject debounce memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::BehaviorStatus;
use crate::{DEFAULT_ACTIVE_CONFIRM_SECS, DEFAULT_AWAY_SECS, DEFAULT_IDLE_SECS};

/// Confirmation windows, fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Motion must be sustained this long to confirm ACTIVE
    pub active_confirm_secs: u64,
    /// Stillness must be sustained this long to confirm IDLE
    pub idle_secs: u64,
    /// Face absence must be sustained this long to confirm AWAY
    pub away_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            active_confirm_secs: DEFAULT_ACTIVE_CONFIRM_SECS,
            idle_secs: DEFAULT_IDLE_SECS,
            away_secs: DEFAULT_AWAY_SECS,
        }
    }
}

/// Signals for one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSignals {
    pub face_present: bool,
    pub motion_value: f64,
    pub motion_threshold: f64,
}

impl BehaviorSignals {
    pub fn new(face_present: bool, motion_value: f64, motion_threshold: f64) -> Self {
        Self {
            face_present,
            motion_value,
            motion_threshold,
        }
    }

    /// No face this tick
    pub fn absent() -> Self {
        Self::new(false, 0.0, 0.0)
    }

    /// `motion_value >= motion_threshold`, with negatives clamped to zero.
    /// A NaN sample never counts as motion.
    pub fn motion_active(&self) -> bool {
        if self.motion_value.is_nan() {
            return false;
        }
        let threshold = if self.motion_threshold.is_nan() { 0.0 } else { self.motion_threshold.max(0.0) };
        self.motion_value.max(0.0) >= threshold
    }
}

/// Debounce memory for one subject.
///
/// Each pair of "since" markers is mutually exclusive: at most one side is
/// set, and a flip clears the other side on the same tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorState {
    /// Output of the previous tick, None before the first
    pub last_state: Option<BehaviorStatus>,
    pub face_present_since: Option<DateTime<Utc>>,
    pub no_face_since: Option<DateTime<Utc>>,
    pub motion_active_since: Option<DateTime<Utc>>,
    pub no_motion_since: Option<DateTime<Utc>>,
}

impl BehaviorState {
    pub fn new() -> Self {
        Self::default()
    }
}
