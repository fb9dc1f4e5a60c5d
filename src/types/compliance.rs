//! Zone compliance outputs and hysteresis memory

use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::types::{Severity, ZoneReason, ZoneStatus};
use crate::COMPLIANCE_EVENT_VERSION;

/// One rule breach inside a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Role is on the regulation's forbidden list
    Forbidden(String),
    /// Role lacks permission for the zone type, or is unknown
    Unauthorized(String),
    /// Fewer than `min` of a required role
    Missing(String),
    /// More than `max` of a required role
    Over(String),
}

impl Violation {
    /// Forbidden and unauthorized force UNAUTHORIZED_PERSON
    pub fn is_access(&self) -> bool {
        matches!(self, Violation::Forbidden(_) | Violation::Unauthorized(_))
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Forbidden(r) => write!(f, "forbidden:{}", r),
            Violation::Unauthorized(r) => write!(f, "unauthorized:{}", r),
            Violation::Missing(r) => write!(f, "missing:{}", r),
            Violation::Over(r) => write!(f, "over:{}", r),
        }
    }
}

impl Serialize for Violation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Violation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (kind, role) = raw
            .split_once(':')
            .ok_or_else(|| serde::de::Error::custom(format!("violation '{}' has no kind", raw)))?;
        let role = role.to_string();
        match kind {
            "forbidden" => Ok(Violation::Forbidden(role)),
            "unauthorized" => Ok(Violation::Unauthorized(role)),
            "missing" => Ok(Violation::Missing(role)),
            "over" => Ok(Violation::Over(role)),
            other => Err(serde::de::Error::custom(format!("unknown violation kind '{}'", other))),
        }
    }
}

/// Hysteresis memory for one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    /// State as reported (after escalation)
    pub state: ZoneStatus,
    /// State as computed before escalation; hysteresis compares this
    pub computed: ZoneStatus,
    /// When `computed` last changed
    pub since: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Evaluated state of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReport {
    pub zone_id: String,
    pub regulation_id: Option<String>,
    pub state: ZoneStatus,
    pub violations: Vec<Violation>,
    pub since: DateTime<Utc>,
    pub severity: Severity,
    pub reason: ZoneReason,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ZoneReport {
    /// Seconds the current state has held
    pub fn held_secs(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.since).num_milliseconds().max(0)) as f64 / 1000.0
    }

    /// Wire event for this report
    pub fn to_event(&self, ts: DateTime<Utc>) -> ComplianceEvent {
        ComplianceEvent {
            event_type: ComplianceEvent::EVENT_TYPE.to_string(),
            zone_id: self.zone_id.clone(),
            regulation_id: self.regulation_id.clone(),
            state: self.state,
            violations: self.violations.iter().map(ToString::to_string).collect(),
            since: self.since.to_rfc3339_opts(SecondsFormat::Millis, true),
            severity: self.severity,
            ts: ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            version: COMPLIANCE_EVENT_VERSION.to_string(),
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self, now: DateTime<Utc>) -> String {
        let violations = if self.violations.is_empty() {
            String::from("-")
        } else {
            self.violations.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
        };
        format!(
            "{:<16} {} | held={:.0}s | {} | {}",
            self.zone_id,
            self.state.as_str().color(self.state.color()).bold(),
            self.held_secs(now),
            violations,
            self.reason.code().dimmed(),
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self, now: DateTime<Utc>) -> String {
        let violations: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        format!(
            "zone={} | state={} | held={:.0}s | violations=[{}] | severity={} | reason={}",
            self.zone_id,
            self.state,
            self.held_secs(now),
            violations.join(","),
            self.severity,
            self.reason.code(),
        )
    }
}

/// `compliance.zone` event, schema version 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub event_type: String,
    pub zone_id: String,
    pub regulation_id: Option<String>,
    pub state: ZoneStatus,
    pub violations: Vec<String>,
    /// ISO-8601
    pub since: String,
    pub severity: Severity,
    /// ISO-8601
    pub ts: String,
    pub version: String,
}

impl ComplianceEvent {
    pub const EVENT_TYPE: &'static str = "compliance.zone";
}

/// Output of one compliance tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub zones: Vec<ZoneReport>,
    pub events: Vec<ComplianceEvent>,
}

impl ComplianceResult {
    pub fn zone(&self, zone_id: &str) -> Option<&ZoneReport> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    /// Zones currently in a violation state
    pub fn violating(&self) -> impl Iterator<Item = &ZoneReport> {
        self.zones.iter().filter(|z| z.state.is_violation())
    }
}
