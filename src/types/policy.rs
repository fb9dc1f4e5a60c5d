//! Zone compliance policy: roles, zones, regulations
//!
//! Loaded once at startup and read-only afterwards. Structural problems are
//! fatal here so the engine never runs against an undefined policy.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{
    DEFAULT_UNAUTHORIZED_ESCALATION_SECS, DEFAULT_UNDERSTAFFED_ESCALATION_SECS, MAX_WINDOW_SECS,
    MIN_ABSENCE_SECS, STALENESS_FACTOR,
};

/// Severity attached to a regulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    Warning,
    #[default]
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::Warning => "warning",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A role and the zone types it may enter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role_id: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

/// A physical zone fed by one or more cameras
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub zone_id: String,
    #[serde(rename = "type")]
    pub zone_type: String,
    #[serde(default)]
    pub camera_ids: Vec<String>,
}

/// Head-count bounds for a required role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLimits {
    #[serde(default)]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: u32,
}

fn default_max() -> u32 {
    999
}

fn default_allowed_absence() -> u64 {
    MIN_ABSENCE_SECS
}

fn default_understaffed() -> u64 {
    DEFAULT_UNDERSTAFFED_ESCALATION_SECS
}

fn default_unauthorized() -> u64 {
    DEFAULT_UNAUTHORIZED_ESCALATION_SECS
}

/// Seconds a violation may persist before escalating to critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Applies to both UNDERSTAFFED and OVERSTAFFED
    #[serde(default = "default_understaffed")]
    pub understaffed: u64,
    #[serde(default = "default_unauthorized")]
    pub unauthorized: u64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            understaffed: DEFAULT_UNDERSTAFFED_ESCALATION_SECS,
            unauthorized: DEFAULT_UNAUTHORIZED_ESCALATION_SECS,
        }
    }
}

/// Policy for one zone type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    #[serde(default)]
    pub regulation_id: Option<String>,
    pub zone_type: String,
    #[serde(default)]
    pub required_roles: BTreeMap<String, RoleLimits>,
    #[serde(default)]
    pub forbidden_roles: BTreeSet<String>,
    #[serde(default = "default_allowed_absence")]
    pub allowed_absence_seconds: u64,
    #[serde(default, rename = "violation_escalation_seconds")]
    pub escalation: EscalationPolicy,
    #[serde(default)]
    pub severity: Severity,
}

/// On-disk shape of the policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
    #[serde(default)]
    pub regulations: Vec<Regulation>,
}

/// Indexed, validated policy
#[derive(Debug, Clone)]
pub struct ZoneComplianceModel {
    roles: HashMap<String, BTreeSet<String>>,
    zones: Vec<ZoneSpec>,
    regulations: HashMap<String, Regulation>,
    camera_to_zone: HashMap<String, String>,
}

impl ZoneComplianceModel {
    /// Validate and index a parsed document
    pub fn from_document(doc: PolicyDocument) -> Result<Self> {
        let mut roles = HashMap::new();
        for role in doc.roles {
            if roles.insert(role.role_id.clone(), role.permissions).is_some() {
                return Err(Error::InvalidPolicy(format!("duplicate role_id '{}'", role.role_id)));
            }
        }

        let mut regulations = HashMap::new();
        for reg in doc.regulations {
            for (role, limits) in &reg.required_roles {
                if limits.min > limits.max {
                    return Err(Error::InvalidPolicy(format!(
                        "regulation for '{}': role '{}' has min {} > max {}",
                        reg.zone_type, role, limits.min, limits.max
                    )));
                }
            }
            let windows = [
                ("allowed_absence_seconds", reg.allowed_absence_seconds),
                ("violation_escalation_seconds.understaffed", reg.escalation.understaffed),
                ("violation_escalation_seconds.unauthorized", reg.escalation.unauthorized),
            ];
            for (field, secs) in windows {
                if secs > MAX_WINDOW_SECS {
                    return Err(Error::InvalidPolicy(format!(
                        "regulation for '{}': {} is {}s, above the {}s maximum",
                        reg.zone_type, field, secs, MAX_WINDOW_SECS
                    )));
                }
            }
            let zone_type = reg.zone_type.clone();
            if regulations.insert(zone_type.clone(), reg).is_some() {
                return Err(Error::InvalidPolicy(format!(
                    "more than one regulation for zone type '{}'",
                    zone_type
                )));
            }
        }

        let mut seen_zones = HashSet::new();
        let mut camera_to_zone = HashMap::new();
        for zone in &doc.zones {
            if !seen_zones.insert(zone.zone_id.as_str()) {
                return Err(Error::InvalidPolicy(format!("duplicate zone_id '{}'", zone.zone_id)));
            }
            for cam in &zone.camera_ids {
                if let Some(other) = camera_to_zone.insert(cam.clone(), zone.zone_id.clone()) {
                    return Err(Error::InvalidPolicy(format!(
                        "camera '{}' mapped to both '{}' and '{}'",
                        cam, other, zone.zone_id
                    )));
                }
            }
        }

        Ok(Self {
            roles,
            zones: doc.zones,
            regulations,
            camera_to_zone,
        })
    }

    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: PolicyDocument = serde_json::from_str(json).map_err(|source| Error::PolicyParse {
            path: "<inline>".into(),
            source,
        })?;
        Self::from_document(doc)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: PolicyDocument = serde_json::from_str(&text).map_err(|source| Error::PolicyParse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_document(doc)
    }

    /// Zones in document order
    pub fn zones(&self) -> &[ZoneSpec] {
        &self.zones
    }

    /// Zone fed by this camera, if any
    pub fn zone_for_source(&self, source_id: &str) -> Option<&str> {
        self.camera_to_zone.get(source_id).map(String::as_str)
    }

    pub fn regulation_for(&self, zone_type: &str) -> Option<&Regulation> {
        self.regulations.get(zone_type)
    }

    /// None when the role is not declared
    pub fn role_permits(&self, role_id: &str, zone_type: &str) -> Option<bool> {
        self.roles.get(role_id).map(|perms| perms.contains(zone_type))
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn regulation_count(&self) -> usize {
        self.regulations.len()
    }

    /// Presence older than this no longer counts: 4 × max(allowed absence, 30 s)
    pub fn staleness_window(&self) -> chrono::Duration {
        let max_absence = self
            .regulations
            .values()
            .map(|r| r.allowed_absence_seconds)
            .fold(MIN_ABSENCE_SECS, u64::max);
        let secs = max_absence.saturating_mul(STALENESS_FACTOR).min(i64::MAX as u64 / 1000);
        chrono::Duration::seconds(secs as i64)
    }
}
