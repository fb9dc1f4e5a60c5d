//! Core modules for Zonewatch

pub mod behavior;
pub mod compliance;
pub mod debounce;
pub mod pose;
pub mod presence;
pub mod runtime;
pub mod tracker;
pub mod zone_store;

pub use behavior::{evaluate, evaluate_traced, BehaviorEngine};
pub use compliance::{ComplianceEngine, ZoneTally};
pub use debounce::{elapsed_secs, MotionEma};
pub use pose::{classify_pose, PoseState};
pub use presence::{latest_per_subject, parse_snapshot, PresenceLog, PresenceSource};
pub use runtime::{
    run_compliance_ticker, spawn_source_worker, BroadcastSink, ComplianceSink, Replay, ReplayOutput, SourceWorker,
};
pub use tracker::{SubjectTracker, SubjectTrackingState, TrackerConfig};
pub use zone_store::ZoneStore;
