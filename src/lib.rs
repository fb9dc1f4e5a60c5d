//! Zonewatch: presence signals in, explainable operational states out
//!
//! raw signals → debounce → behavior state machine → presence events
//! presence snapshot → zone compliance engine → zone states + compliance events

pub mod config;
pub mod core;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};

// =============================================================================
// BEHAVIOR WINDOWS [s] - deployment defaults
// =============================================================================

/// Sustained motion needed before a subject is confirmed ACTIVE
pub const DEFAULT_ACTIVE_CONFIRM_SECS: u64 = 30;

/// Sustained stillness (face present) before a subject is IDLE
pub const DEFAULT_IDLE_SECS: u64 = 60;

/// Sustained face absence before a subject is AWAY
pub const DEFAULT_AWAY_SECS: u64 = 120;

/// Motion EMA at or above this counts as moving (pixels of bbox-center travel)
pub const DEFAULT_MOTION_THRESHOLD: f64 = 2.0;

/// Weight of the previous EMA value
pub const MOTION_EMA_KEEP: f64 = 0.7;

/// Weight of the new motion sample
pub const MOTION_EMA_SAMPLE: f64 = 0.3;

// =============================================================================
// INGEST
// =============================================================================

/// Re-send an unchanged status at most this often
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// Minimum gap between two away events for the same subject
pub const AWAY_RESEND_MIN_SECS: f64 = 1.0;

/// Forget subjects unseen for this long
pub const DEFAULT_RETENTION_SECS: u64 = 600;

/// Mean joint visibility needed to classify a pose
pub const DEFAULT_POSE_VISIBILITY: f64 = 0.35;

// =============================================================================
// COMPLIANCE
// =============================================================================

/// Floor for the largest allowed absence when sizing the staleness window
pub const MIN_ABSENCE_SECS: u64 = 30;

/// Staleness window = this factor × max(allowed absence)
pub const STALENESS_FACTOR: u64 = 4;

/// UNDERSTAFFED/OVERSTAFFED → CRITICAL_VIOLATION after this long
pub const DEFAULT_UNDERSTAFFED_ESCALATION_SECS: u64 = 120;

/// UNAUTHORIZED_PERSON → CRITICAL_VIOLATION after this long
pub const DEFAULT_UNAUTHORIZED_ESCALATION_SECS: u64 = 60;

/// Periodic compliance evaluation
pub const DEFAULT_TICK_SECS: u64 = 10;

/// Upper bound for every configured duration (policy windows, behavior
/// windows, tick, retention): one week
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Role used when a presence record carries none
pub const UNKNOWN_ROLE: &str = "unknown";

/// Payload keys searched for a role, first non-empty wins
pub const ROLE_KEYS: [&str; 3] = ["role", "staff_role", "entity_role"];

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";

/// Version stamped on every compliance event
pub const COMPLIANCE_EVENT_VERSION: &str = "1.0";
