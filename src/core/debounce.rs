//! Signal debouncing: "since" markers and the motion EMA
//!
//! A "since" marker records when the current run of a boolean condition
//! began. Marking is idempotent; clearing is immediate.

use chrono::{DateTime, Utc};

use crate::{MOTION_EMA_KEEP, MOTION_EMA_SAMPLE};

/// Seconds since `since`, clamped at zero; 0 when unset
pub fn elapsed_secs(now: DateTime<Utc>, since: Option<DateTime<Utc>>) -> f64 {
    since
        .map(|s| ((now - s).num_milliseconds().max(0)) as f64 / 1000.0)
        .unwrap_or(0.0)
}

/// Track a complementary pair of markers for one condition.
///
/// Sets `on_since` (if not already set) and clears `off_since` when the
/// condition holds, the reverse when it does not.
pub fn track(
    condition: bool,
    now: DateTime<Utc>,
    on_since: &mut Option<DateTime<Utc>>,
    off_since: &mut Option<DateTime<Utc>>,
) {
    if condition {
        *off_since = None;
        on_since.get_or_insert(now);
    } else {
        *on_since = None;
        off_since.get_or_insert(now);
    }
}

/// Exponential moving average of motion samples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionEma {
    value: f64,
    last_position: Option<(f64, f64)>,
}

impl MotionEma {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a position. The first position only anchors; later ones blend
    /// the travelled distance into the average.
    pub fn update_position(&mut self, position: (f64, f64)) -> f64 {
        if let Some((px, py)) = self.last_position {
            let step = ((position.0 - px).powi(2) + (position.1 - py).powi(2)).sqrt();
            self.update_sample(step);
        }
        self.last_position = Some(position);
        self.value
    }

    /// Blend one motion sample: ema' = 0.7·ema + 0.3·sample
    pub fn update_sample(&mut self, sample: f64) -> f64 {
        if sample.is_finite() {
            self.value = MOTION_EMA_KEEP * self.value + MOTION_EMA_SAMPLE * sample.max(0.0);
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn last_position(&self) -> Option<(f64, f64)> {
        self.last_position
    }
}
