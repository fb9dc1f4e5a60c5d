//! Runtime settings: CLI flags with environment fallbacks

use std::path::PathBuf;

use clap::Args;

use crate::core::TrackerConfig;
use crate::error::{Error, Result};
use crate::types::BehaviorConfig;
use crate::{
    DEFAULT_ACTIVE_CONFIRM_SECS, DEFAULT_AWAY_SECS, DEFAULT_HEARTBEAT_SECS, DEFAULT_IDLE_SECS,
    DEFAULT_MOTION_THRESHOLD, DEFAULT_POSE_VISIBILITY, DEFAULT_RETENTION_SECS, DEFAULT_TICK_SECS, MAX_WINDOW_SECS,
};

#[derive(Args, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Policy document (roles, zones, regulations) as JSON
    #[arg(long = "policy", env = "COMPLIANCE_POLICY")]
    pub policy: Option<PathBuf>,

    /// Sustained motion before ACTIVE [s]
    #[arg(long, env = "ACTIVE_CONFIRM_SECONDS", default_value_t = DEFAULT_ACTIVE_CONFIRM_SECS)]
    pub active_confirm_seconds: u64,

    /// Sustained stillness before IDLE [s]
    #[arg(long, env = "IDLE_SECONDS", default_value_t = DEFAULT_IDLE_SECS)]
    pub idle_seconds: u64,

    /// Sustained absence before AWAY [s]
    #[arg(long, env = "AWAY_SECONDS", default_value_t = DEFAULT_AWAY_SECS)]
    pub away_seconds: u64,

    /// Motion EMA at or above this counts as moving
    #[arg(long, env = "MOTION_ACTIVE_THRESHOLD", default_value_t = DEFAULT_MOTION_THRESHOLD)]
    pub motion_active_threshold: f64,

    /// Re-send an unchanged status after this long [s]
    #[arg(long, env = "PRESENCE_HEARTBEAT_SECONDS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub presence_heartbeat_seconds: u64,

    /// Mean joint visibility needed to classify pose
    #[arg(long, env = "POSE_VISIBILITY_THRESHOLD", default_value_t = DEFAULT_POSE_VISIBILITY)]
    pub pose_visibility_threshold: f64,

    /// Compliance evaluation period [s]
    #[arg(long, env = "COMPLIANCE_TICK_SECONDS", default_value_t = DEFAULT_TICK_SECS)]
    pub compliance_tick_seconds: u64,

    /// Forget subjects unseen for this long [s]
    #[arg(long, env = "SUBJECT_RETENTION_SECONDS", default_value_t = DEFAULT_RETENTION_SECS)]
    pub subject_retention_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: None,
            active_confirm_seconds: DEFAULT_ACTIVE_CONFIRM_SECS,
            idle_seconds: DEFAULT_IDLE_SECS,
            away_seconds: DEFAULT_AWAY_SECS,
            motion_active_threshold: DEFAULT_MOTION_THRESHOLD,
            presence_heartbeat_seconds: DEFAULT_HEARTBEAT_SECS,
            pose_visibility_threshold: DEFAULT_POSE_VISIBILITY,
            compliance_tick_seconds: DEFAULT_TICK_SECS,
            subject_retention_seconds: DEFAULT_RETENTION_SECS,
        }
    }
}

impl Settings {
    /// Reject values no deployment can mean
    pub fn validate(&self) -> Result<()> {
        if !self.motion_active_threshold.is_finite() || self.motion_active_threshold < 0.0 {
            return Err(Error::InvalidSetting {
                name: "MOTION_ACTIVE_THRESHOLD",
                reason: format!("must be a finite number >= 0, got {}", self.motion_active_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.pose_visibility_threshold) {
            return Err(Error::InvalidSetting {
                name: "POSE_VISIBILITY_THRESHOLD",
                reason: format!("must be within 0..=1, got {}", self.pose_visibility_threshold),
            });
        }
        if self.compliance_tick_seconds == 0 {
            return Err(Error::InvalidSetting {
                name: "COMPLIANCE_TICK_SECONDS",
                reason: "must be at least 1".into(),
            });
        }
        let windows = [
            ("ACTIVE_CONFIRM_SECONDS", self.active_confirm_seconds),
            ("IDLE_SECONDS", self.idle_seconds),
            ("AWAY_SECONDS", self.away_seconds),
            ("PRESENCE_HEARTBEAT_SECONDS", self.presence_heartbeat_seconds),
            ("COMPLIANCE_TICK_SECONDS", self.compliance_tick_seconds),
            ("SUBJECT_RETENTION_SECONDS", self.subject_retention_seconds),
        ];
        for (name, secs) in windows {
            if secs > MAX_WINDOW_SECS {
                return Err(Error::InvalidSetting {
                    name,
                    reason: format!("must be at most {}, got {}", MAX_WINDOW_SECS, secs),
                });
            }
        }
        Ok(())
    }

    pub fn behavior(&self) -> BehaviorConfig {
        BehaviorConfig {
            active_confirm_secs: self.active_confirm_seconds,
            idle_secs: self.idle_seconds,
            away_secs: self.away_seconds,
        }
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            behavior: self.behavior(),
            motion_threshold: self.motion_active_threshold,
            heartbeat_secs: self.presence_heartbeat_seconds,
            pose_visibility_threshold: self.pose_visibility_threshold,
        }
    }
}
