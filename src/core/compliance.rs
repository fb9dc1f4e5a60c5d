//! Zone compliance engine
//!
//! Per tick, per zone:
//! 1. Map presence records to zones through the camera table
//! 2. Tally roles (payload `role` / `staff_role` / `entity_role`, else "unknown")
//! 3. No regulation → INITIALIZING first time, UNKNOWN after
//! 4. Nothing inside the staleness window → INITIALIZING first time, UNKNOWN after
//! 5. Otherwise: forbidden / unauthorized / missing / over violations
//! 6. Hysteresis: `since` survives while the computed state repeats
//! 7. Escalation: staffing or access violations held past their window → CRITICAL_VIOLATION
//!
//! The zone store is the only memory. Missing data never fails an evaluation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::core::presence::PresenceSource;
use crate::core::zone_store::ZoneStore;
use crate::types::{
    ComplianceResult, PresenceRecord, Regulation, Severity, Violation, ZoneComplianceModel, ZoneReason,
    ZoneReport, ZoneSpec, ZoneState, ZoneStatus,
};

/// Role head-count and freshest sighting for one zone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneTally {
    pub counts: BTreeMap<String, u32>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Computed (pre-hysteresis) verdict for one zone
struct Verdict {
    computed: ZoneStatus,
    violations: Vec<Violation>,
    severity: Severity,
    reason: ZoneReason,
}

#[derive(Debug, Clone)]
pub struct ComplianceEngine {
    model: Arc<ZoneComplianceModel>,
    store: Arc<ZoneStore>,
}

impl ComplianceEngine {
    /// Engine with its own zone store
    pub fn new(model: Arc<ZoneComplianceModel>) -> Self {
        Self::with_store(model, Arc::new(ZoneStore::new()))
    }

    /// Engine sharing an existing zone store
    pub fn with_store(model: Arc<ZoneComplianceModel>, store: Arc<ZoneStore>) -> Self {
        Self { model, store }
    }

    pub fn model(&self) -> &ZoneComplianceModel {
        &self.model
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// Oldest sighting that still counts at `now`
    pub fn presence_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.model.staleness_window()).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Pull a snapshot from `source` and evaluate it
    pub fn evaluate_source(&self, source: &dyn PresenceSource, now: DateTime<Utc>) -> ComplianceResult {
        let presence = source.current_presence(self.presence_cutoff(now));
        self.evaluate(&presence, now)
    }

    /// Evaluate every zone against a presence snapshot
    pub fn evaluate(&self, presence: &[PresenceRecord], now: DateTime<Utc>) -> ComplianceResult {
        let tallies = self.tally(presence, now);
        let zones: Vec<ZoneReport> = self
            .model
            .zones()
            .iter()
            .map(|zone| self.evaluate_one(zone, tallies.get(zone.zone_id.as_str()), now))
            .collect();
        let events = zones.iter().map(|z| z.to_event(now)).collect();
        ComplianceResult { zones, events }
    }

    /// Evaluate a single zone on demand; None for an unknown zone id
    pub fn evaluate_zone(&self, zone_id: &str, presence: &[PresenceRecord], now: DateTime<Utc>) -> Option<ZoneReport> {
        let zone = self.model.zones().iter().find(|z| z.zone_id == zone_id)?;
        let tallies = self.tally(presence, now);
        Some(self.evaluate_one(zone, tallies.get(zone_id), now))
    }

    /// Count roles per zone. Unmapped sources, untimed records and records
    /// older than the staleness window are skipped.
    pub fn tally(&self, presence: &[PresenceRecord], now: DateTime<Utc>) -> HashMap<String, ZoneTally> {
        let cutoff = self.presence_cutoff(now);
        let mut tallies: HashMap<String, ZoneTally> = HashMap::new();

        for record in presence {
            let Some(seen) = record.last_seen_ts.filter(|ts| *ts >= cutoff) else {
                continue;
            };
            let Some(zone_id) = record.source_id.as_deref().and_then(|s| self.model.zone_for_source(s)) else {
                continue;
            };
            let tally = tallies.entry(zone_id.to_string()).or_default();
            *tally.counts.entry(record.role_or_unknown()).or_insert(0) += 1;
            tally.last_seen = Some(tally.last_seen.map_or(seen, |prev| prev.max(seen)));
        }
        tallies
    }

    fn evaluate_one(&self, zone: &ZoneSpec, tally: Option<&ZoneTally>, now: DateTime<Utc>) -> ZoneReport {
        let regulation = self.model.regulation_for(&zone.zone_type);
        let last_seen = tally.and_then(|t| t.last_seen);

        self.store.with_zone(&zone.zone_id, |prev| {
            let verdict = match (regulation, tally.filter(|t| t.last_seen.is_some())) {
                (None, _) => {
                    if prev.is_none() {
                        warn!(zone = %zone.zone_id, zone_type = %zone.zone_type, "zone has no regulation");
                    }
                    Verdict {
                        computed: not_observed(prev),
                        violations: Vec::new(),
                        severity: Severity::Info,
                        reason: ZoneReason::Z001_NO_REGULATION,
                    }
                }
                (Some(_), None) => {
                    if prev.is_some_and(|p| p.computed != ZoneStatus::Unknown && p.computed != ZoneStatus::Initializing) {
                        warn!(zone = %zone.zone_id, "zone lost presence signal");
                    }
                    Verdict {
                        computed: not_observed(prev),
                        violations: Vec::new(),
                        severity: Severity::Info,
                        reason: ZoneReason::Z002_NO_SIGNAL,
                    }
                }
                (Some(reg), Some(tally)) => self.judge(zone, reg, tally),
            };

            let since = match prev {
                Some(p) if p.computed == verdict.computed => p.since,
                _ => now,
            };

            let (state, reason) = match regulation {
                Some(reg) if escalates(verdict.computed, reg, now - since) => {
                    (ZoneStatus::CriticalViolation, ZoneReason::Z005_ESCALATED)
                }
                _ => (verdict.computed, verdict.reason),
            };

            if prev.map(|p| p.state) != Some(state) {
                info!(
                    zone = %zone.zone_id,
                    from = ?prev.map(|p| p.state),
                    to = %state,
                    reason = reason.code(),
                    "zone state change"
                );
            }

            let next = ZoneState {
                state,
                computed: verdict.computed,
                since,
                last_seen,
            };
            let report = ZoneReport {
                zone_id: zone.zone_id.clone(),
                regulation_id: regulation.and_then(|r| r.regulation_id.clone()),
                state,
                violations: verdict.violations,
                since,
                severity: verdict.severity,
                reason,
                last_seen,
            };
            (next, report)
        })
    }

    /// Violations for an observed, regulated zone
    fn judge(&self, zone: &ZoneSpec, reg: &Regulation, tally: &ZoneTally) -> Verdict {
        let mut violations = Vec::new();

        for role in tally.counts.keys() {
            if reg.forbidden_roles.contains(role) {
                violations.push(Violation::Forbidden(role.clone()));
            }
            // Undeclared roles (including "unknown") have no permissions
            if self.model.role_permits(role, &zone.zone_type) != Some(true) {
                violations.push(Violation::Unauthorized(role.clone()));
            }
        }

        let mut understaffed = false;
        let mut overstaffed = false;
        for (role, limits) in &reg.required_roles {
            let count = tally.counts.get(role).copied().unwrap_or(0);
            if count < limits.min {
                violations.push(Violation::Missing(role.clone()));
                understaffed = true;
            }
            if count > limits.max {
                violations.push(Violation::Over(role.clone()));
                overstaffed = true;
            }
        }

        let computed = if violations.iter().any(Violation::is_access) {
            ZoneStatus::UnauthorizedPerson
        } else if understaffed {
            ZoneStatus::Understaffed
        } else if overstaffed {
            ZoneStatus::Overstaffed
        } else {
            ZoneStatus::Compliant
        };

        Verdict {
            reason: if violations.is_empty() { ZoneReason::Z003_COMPLIANT } else { ZoneReason::Z004_VIOLATIONS },
            computed,
            violations,
            severity: reg.severity,
        }
    }
}

/// Never evaluated → INITIALIZING, otherwise UNKNOWN
fn not_observed(prev: Option<&ZoneState>) -> ZoneStatus {
    if prev.is_none() {
        ZoneStatus::Initializing
    } else {
        ZoneStatus::Unknown
    }
}

/// Inclusive: a violation held for exactly the window escalates
fn escalates(computed: ZoneStatus, reg: &Regulation, held: Duration) -> bool {
    let window = match computed {
        ZoneStatus::Understaffed | ZoneStatus::Overstaffed => reg.escalation.understaffed,
        ZoneStatus::UnauthorizedPerson => reg.escalation.unauthorized,
        _ => return false,
    };
    held >= Duration::seconds(window.min(i64::MAX as u64 / 1000) as i64)
}

// =============================================================================
// TESTS
// =============================================================================
