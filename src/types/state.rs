//! Behavior and zone state definitions

use colored::Color;
use serde::{Deserialize, Serialize};

/// Per-subject behavior. There is no "unknown": a cold start resolves
/// immediately to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorStatus {
    /// Face present, motion sustained
    Active,
    /// Face present, no motion
    Idle,
    /// No face
    Away,
}

impl BehaviorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorStatus::Active => "active",
            BehaviorStatus::Idle => "idle",
            BehaviorStatus::Away => "away",
        }
    }

    /// Terminal color
    pub fn color(&self) -> Color {
        match self {
            BehaviorStatus::Active => Color::Green,
            BehaviorStatus::Idle => Color::Yellow,
            BehaviorStatus::Away => Color::BrightBlack,
        }
    }
}

impl std::fmt::Display for BehaviorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regulatory state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneStatus {
    /// Never observed
    Initializing,
    /// Observed before, signal now lost (or no regulation)
    Unknown,
    Compliant,
    Understaffed,
    Overstaffed,
    UnauthorizedPerson,
    /// A violation outlived its escalation window
    CriticalViolation,
}

impl ZoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Initializing => "INITIALIZING",
            ZoneStatus::Unknown => "UNKNOWN",
            ZoneStatus::Compliant => "COMPLIANT",
            ZoneStatus::Understaffed => "UNDERSTAFFED",
            ZoneStatus::Overstaffed => "OVERSTAFFED",
            ZoneStatus::UnauthorizedPerson => "UNAUTHORIZED_PERSON",
            ZoneStatus::CriticalViolation => "CRITICAL_VIOLATION",
        }
    }

    /// Position in the informal severity order. Staffing and
    /// unauthorized states share a rank.
    pub fn severity_rank(&self) -> u8 {
        match self {
            ZoneStatus::Initializing => 0,
            ZoneStatus::Unknown => 1,
            ZoneStatus::Compliant => 2,
            ZoneStatus::Understaffed
            | ZoneStatus::Overstaffed
            | ZoneStatus::UnauthorizedPerson => 3,
            ZoneStatus::CriticalViolation => 4,
        }
    }

    /// Is this a non-compliant state?
    pub fn is_violation(&self) -> bool {
        self.severity_rank() >= 3
    }

    /// Terminal color
    pub fn color(&self) -> Color {
        match self {
            ZoneStatus::Initializing | ZoneStatus::Unknown => Color::BrightBlack,
            ZoneStatus::Compliant => Color::Green,
            ZoneStatus::Understaffed | ZoneStatus::Overstaffed => Color::Yellow,
            ZoneStatus::UnauthorizedPerson => Color::Magenta,
            ZoneStatus::CriticalViolation => Color::Red,
        }
    }
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_status_wire_names() {
        let json = serde_json::to_string(&ZoneStatus::UnauthorizedPerson).unwrap();
        assert_eq!(json, "\"UNAUTHORIZED_PERSON\"");
        assert_eq!(ZoneStatus::CriticalViolation.to_string(), "CRITICAL_VIOLATION");
    }

    #[test]
    fn test_behavior_status_lowercase() {
        let s: BehaviorStatus = serde_json::from_str("\"away\"").unwrap();
        assert_eq!(s, BehaviorStatus::Away);
    }

    #[test]
    fn test_severity_order() {
        assert!(ZoneStatus::Initializing.severity_rank() < ZoneStatus::Unknown.severity_rank());
        assert!(ZoneStatus::Compliant.severity_rank() < ZoneStatus::Overstaffed.severity_rank());
        assert!(ZoneStatus::UnauthorizedPerson.severity_rank() < ZoneStatus::CriticalViolation.severity_rank());
        assert!(!ZoneStatus::Compliant.is_violation());
        assert!(ZoneStatus::Understaffed.is_violation());
    }
}
