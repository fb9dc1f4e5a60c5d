//! Behavior decision output

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::types::{BehaviorRule, BehaviorStatus};

/// Result of one behavior tick, with the rule that fired and the elapsed
/// windows it was judged on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDecision {
    pub status: BehaviorStatus,
    pub rule: BehaviorRule,
    pub no_face_secs: f64,
    pub no_motion_secs: f64,
    pub motion_active_secs: f64,
}

impl BehaviorDecision {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        format!(
            "{} | {} | no_face={:.1}s no_motion={:.1}s moving={:.1}s",
            self.status.as_str().color(self.status.color()).bold(),
            self.rule.code().dimmed(),
            self.no_face_secs,
            self.no_motion_secs,
            self.motion_active_secs,
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "status={} | rule={} | no_face={:.1}s | no_motion={:.1}s | moving={:.1}s",
            self.status,
            self.rule.code(),
            self.no_face_secs,
            self.no_motion_secs,
            self.motion_active_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parseable_string() {
        let decision = BehaviorDecision {
            status: BehaviorStatus::Idle,
            rule: BehaviorRule::B002_IDLE_CONFIRMED,
            no_face_secs: 0.0,
            no_motion_secs: 61.25,
            motion_active_secs: 0.0,
        };
        assert_eq!(
            decision.to_parseable_string(),
            "status=idle | rule=B002_IDLE_CONFIRMED | no_face=0.0s | no_motion=61.2s | moving=0.0s"
        );
        assert!(decision.to_terminal_string().contains("B002_IDLE_CONFIRMED"));
    }
}
