//! Rule codes: every emitted state names the rule that produced it

use serde::{Deserialize, Serialize};

/// Behavior rules, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum BehaviorRule {
    // =========================================================================
    // B00x: Confirmed by a full window
    // =========================================================================
    /// No face for the away window
    B001_AWAY_CONFIRMED,
    /// Face present, no motion for the idle window
    B002_IDLE_CONFIRMED,
    /// Face present, motion for the active-confirm window
    B003_ACTIVE_CONFIRMED,

    // =========================================================================
    // Inside a confirmation window
    // =========================================================================
    /// Previous active/idle kept while evidence accumulates
    B004_STATE_HELD,
    /// Back from away with motion
    B005_RETURN_ACTIVE,
    /// Back from away without motion
    B006_RETURN_IDLE,
    /// First sighting with motion
    B007_COLD_START_ACTIVE,
    /// First sighting without motion
    B008_COLD_START_IDLE,
    /// No face and no window confirmed yet
    B009_NO_FACE,
}

impl BehaviorRule {
    /// Get the code string (for logging and payloads)
    pub fn code(&self) -> &'static str {
        match self {
            Self::B001_AWAY_CONFIRMED => "B001_AWAY_CONFIRMED",
            Self::B002_IDLE_CONFIRMED => "B002_IDLE_CONFIRMED",
            Self::B003_ACTIVE_CONFIRMED => "B003_ACTIVE_CONFIRMED",
            Self::B004_STATE_HELD => "B004_STATE_HELD",
            Self::B005_RETURN_ACTIVE => "B005_RETURN_ACTIVE",
            Self::B006_RETURN_IDLE => "B006_RETURN_IDLE",
            Self::B007_COLD_START_ACTIVE => "B007_COLD_START_ACTIVE",
            Self::B008_COLD_START_IDLE => "B008_COLD_START_IDLE",
            Self::B009_NO_FACE => "B009_NO_FACE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::B001_AWAY_CONFIRMED => "Face absent for the away window",
            Self::B002_IDLE_CONFIRMED => "No motion for the idle window",
            Self::B003_ACTIVE_CONFIRMED => "Motion sustained for the confirm window",
            Self::B004_STATE_HELD => "Previous state held while confirming",
            Self::B005_RETURN_ACTIVE => "Returned from away, moving",
            Self::B006_RETURN_IDLE => "Returned from away, still",
            Self::B007_COLD_START_ACTIVE => "First sighting, moving",
            Self::B008_COLD_START_IDLE => "First sighting, still",
            Self::B009_NO_FACE => "No face",
        }
    }
}

impl std::fmt::Display for BehaviorRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Why a zone ended up in its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ZoneReason {
    /// Zone type has no regulation
    Z001_NO_REGULATION,
    /// No presence inside the staleness window
    Z002_NO_SIGNAL,
    /// Observed, no violations
    Z003_COMPLIANT,
    /// Observed, violations present
    Z004_VIOLATIONS,
    /// Violation outlived its escalation window
    Z005_ESCALATED,
}

impl ZoneReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Z001_NO_REGULATION => "Z001_NO_REGULATION",
            Self::Z002_NO_SIGNAL => "Z002_NO_SIGNAL",
            Self::Z003_COMPLIANT => "Z003_COMPLIANT",
            Self::Z004_VIOLATIONS => "Z004_VIOLATIONS",
            Self::Z005_ESCALATED => "Z005_ESCALATED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Z001_NO_REGULATION => "No regulation for zone type",
            Self::Z002_NO_SIGNAL => "No recent presence",
            Self::Z003_COMPLIANT => "All requirements met",
            Self::Z004_VIOLATIONS => "Requirements violated",
            Self::Z005_ESCALATED => "Violation escalated",
        }
    }
}

impl std::fmt::Display for ZoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
