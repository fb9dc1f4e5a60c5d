//! Core types for Zonewatch

mod state;
mod signals;
mod output;
mod reason;
mod policy;
mod presence;
mod compliance;

pub use state::{BehaviorStatus, ZoneStatus};
pub use signals::{BehaviorConfig, BehaviorSignals, BehaviorState};
pub use output::BehaviorDecision;
pub use reason::{BehaviorRule, ZoneReason};
pub use policy::{
    EscalationPolicy, PolicyDocument, Regulation, RoleLimits, RoleSpec, Severity,
    ZoneComplianceModel, ZoneSpec,
};
pub use presence::{FaceObservation, FrameSample, PoseLandmark, PresenceEvent, PresenceRecord};
pub use compliance::{ComplianceEvent, ComplianceResult, Violation, ZoneReport, ZoneState};
