//! Per-source subject tracking
//!
//! One tracker per source, owned by that source's worker: no locking.
//! Subjects are keyed `<employee_id>@<source>` or `anon@<source>`.
//!
//! - Face seen: EMA motion from bbox-center travel → behavior tick → emit on
//!   change or heartbeat
//! - No face in frame: subjects unseen for the away window get one AWAY event
//! - Subjects unseen past the retention period are dropped

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::core::behavior::BehaviorEngine;
use crate::core::debounce::{elapsed_secs, MotionEma};
use crate::core::pose::{classify_pose, PoseState};
use crate::types::{
    BehaviorConfig, BehaviorSignals, BehaviorState, BehaviorStatus, FaceObservation, FrameSample, PresenceEvent,
};
use crate::{AWAY_RESEND_MIN_SECS, DEFAULT_HEARTBEAT_SECS, DEFAULT_MOTION_THRESHOLD, DEFAULT_POSE_VISIBILITY};

/// Tracker tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub behavior: BehaviorConfig,
    pub motion_threshold: f64,
    pub heartbeat_secs: u64,
    pub pose_visibility_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            behavior: BehaviorConfig::default(),
            motion_threshold: DEFAULT_MOTION_THRESHOLD,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            pose_visibility_threshold: DEFAULT_POSE_VISIBILITY,
        }
    }
}

/// Everything remembered about one subject at one source
#[derive(Debug, Clone)]
pub struct SubjectTrackingState {
    pub employee_id: Option<String>,
    pub role: Option<String>,
    /// Last status actually sent downstream
    pub last_status: Option<BehaviorStatus>,
    pub last_sent: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub motion: MotionEma,
    pub behavior: BehaviorState,
    pub pose: PoseState,
    pub pose_conf: f64,
}

impl SubjectTrackingState {
    fn new(employee_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            employee_id,
            role: None,
            last_status: None,
            last_sent: None,
            last_seen: now,
            motion: MotionEma::new(),
            behavior: BehaviorState::new(),
            pose: PoseState::Unknown,
            pose_conf: 0.0,
        }
    }

    fn since_sent(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_sent.map(|sent| elapsed_secs(now, Some(sent)))
    }
}

/// Subject map for a single source
#[derive(Debug)]
pub struct SubjectTracker {
    source_id: String,
    config: TrackerConfig,
    engine: BehaviorEngine,
    subjects: BTreeMap<String, SubjectTrackingState>,
}

impl SubjectTracker {
    pub fn new(source_id: impl Into<String>, config: TrackerConfig) -> Self {
        Self {
            source_id: source_id.into(),
            config,
            engine: BehaviorEngine::new(config.behavior),
            subjects: BTreeMap::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Subject key for a face at this source
    pub fn subject_key(&self, employee_id: Option<&str>) -> String {
        match employee_id {
            Some(id) => format!("{}@{}", id, self.source_id),
            None => format!("anon@{}", self.source_id),
        }
    }

    pub fn subject(&self, key: &str) -> Option<&SubjectTrackingState> {
        self.subjects.get(key)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Route one frame: largest face is observed, an empty frame sweeps
    pub fn observe_frame(&mut self, frame: &FrameSample) -> Vec<PresenceEvent> {
        match frame.primary_face() {
            Some(face) => self.observe(face, frame.ts).into_iter().collect(),
            None => self.sweep_absent(frame.ts),
        }
    }

    /// Observe a detected face; returns an event when one is due
    pub fn observe(&mut self, face: &FaceObservation, now: DateTime<Utc>) -> Option<PresenceEvent> {
        let key = self.subject_key(face.subject_id.as_deref());
        let threshold = self.config.motion_threshold;
        let heartbeat = self.config.heartbeat_secs as f64;

        let st = self
            .subjects
            .entry(key.clone())
            .or_insert_with(|| SubjectTrackingState::new(face.subject_id.clone(), now));
        st.last_seen = now;
        if face.role.is_some() {
            st.role = face.role.clone();
        }

        let motion = st.motion.update_position(face.center());
        let (pose, pose_conf) = classify_pose(face.landmarks.as_deref(), self.config.pose_visibility_threshold);
        st.pose = pose;
        st.pose_conf = pose_conf;

        let decision = self
            .engine
            .evaluate(&mut st.behavior, &BehaviorSignals::new(true, motion, threshold), now);
        let status = decision.status;

        let changed = st.last_status != Some(status);
        let heartbeat_due = st.since_sent(now).map_or(true, |s| s >= heartbeat);
        if !changed && !heartbeat_due {
            return None;
        }
        if changed {
            debug!(subject = %key, status = %status, rule = decision.rule.code(), "status change");
        }
        st.last_status = Some(status);
        st.last_sent = Some(now);

        let motion_state = match status {
            BehaviorStatus::Away => "left_frame",
            _ if motion >= threshold => "moving",
            _ => "no_motion",
        };

        let mut payload = Map::new();
        payload.insert("match_score".into(), json!(face.match_score));
        payload.insert("bbox".into(), json!(face.bbox));
        payload.insert("motion_ema".into(), json!(motion));
        payload.insert("motion_state".into(), json!(motion_state));
        payload.insert("pose_state".into(), json!(pose.as_str()));
        payload.insert("pose_conf".into(), json!(pose_conf));
        payload.insert("rule".into(), json!(decision.rule.code()));
        if let Some(role) = &st.role {
            payload.insert("role".into(), Value::String(role.clone()));
        }

        Some(PresenceEvent {
            ts: now,
            employee_id: st.employee_id.clone(),
            anonymous_track_id: if st.employee_id.is_some() { None } else { Some(key) },
            source_id: self.source_id.clone(),
            event: status,
            confidence: face.det_score,
            payload,
        })
    }

    /// Frame with no face: send AWAY for subjects unseen for the away window
    pub fn sweep_absent(&mut self, now: DateTime<Utc>) -> Vec<PresenceEvent> {
        let away_secs = self.config.behavior.away_secs as f64;
        let mut events = Vec::new();

        for (key, st) in self.subjects.iter_mut() {
            if elapsed_secs(now, Some(st.last_seen)) < away_secs {
                continue;
            }
            if st.last_status == Some(BehaviorStatus::Away) {
                continue;
            }
            if st.since_sent(now).is_some_and(|s| s < AWAY_RESEND_MIN_SECS) {
                continue;
            }

            // Keep the state machine in step so a return takes the fast path
            let decision = self.engine.evaluate(&mut st.behavior, &BehaviorSignals::absent(), now);
            st.last_status = Some(BehaviorStatus::Away);
            st.last_sent = Some(now);
            debug!(subject = %key, rule = decision.rule.code(), "left frame");

            let mut payload = Map::new();
            payload.insert("reason".into(), json!("left_frame"));
            payload.insert("rule".into(), json!(decision.rule.code()));
            if let Some(role) = &st.role {
                payload.insert("role".into(), Value::String(role.clone()));
            }

            events.push(PresenceEvent {
                ts: now,
                employee_id: st.employee_id.clone(),
                anonymous_track_id: if st.employee_id.is_some() { None } else { Some(key.clone()) },
                source_id: self.source_id.clone(),
                event: BehaviorStatus::Away,
                confidence: 0.0,
                payload,
            });
        }
        events
    }

    /// Drop subjects unseen for longer than `retention_secs`
    pub fn prune(&mut self, now: DateTime<Utc>, retention_secs: u64) -> usize {
        let before = self.subjects.len();
        self.subjects
            .retain(|_, st| elapsed_secs(now, Some(st.last_seen)) <= retention_secs as f64);
        let removed = before - self.subjects.len();
        if removed > 0 {
            info!(source = %self.source_id, removed, "pruned stale subjects");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn face(id: Option<&str>, x: f64) -> FaceObservation {
        FaceObservation {
            subject_id: id.map(String::from),
            match_score: 0.8,
            det_score: 0.95,
            bbox: [x, 100.0, x + 50.0, 160.0],
            role: Some("guard".into()),
            landmarks: None,
        }
    }

    fn tracker() -> SubjectTracker {
        SubjectTracker::new("cam-1", TrackerConfig::default())
    }

    #[test]
    fn test_first_sighting_emits() {
        let mut tr = tracker();
        let ev = tr.observe(&face(Some("e1"), 0.0), t(0)).unwrap();
        // EMA starts at 0: still → idle
        assert_eq!(ev.event, BehaviorStatus::Idle);
        assert_eq!(ev.employee_id.as_deref(), Some("e1"));
        assert_eq!(ev.anonymous_track_id, None);
        assert_eq!(ev.payload["role"], "guard");
        assert_eq!(ev.payload["motion_state"], "no_motion");
        assert_eq!(ev.payload["rule"], "B008_COLD_START_IDLE");
    }

    #[test]
    fn test_heartbeat_throttles_unchanged_status() {
        let mut tr = tracker();
        assert!(tr.observe(&face(Some("e1"), 0.0), t(0)).is_some());
        assert!(tr.observe(&face(Some("e1"), 0.0), t(2)).is_none());
        assert!(tr.observe(&face(Some("e1"), 0.0), t(4)).is_none());
        assert!(tr.observe(&face(Some("e1"), 0.0), t(5)).is_some());
    }

    #[test]
    fn test_motion_from_bbox_travel() {
        let mut tr = tracker();
        tr.observe(&face(None, 0.0), t(0));
        tr.observe(&face(None, 20.0), t(1));
        let st = tr.subject("anon@cam-1").unwrap();
        assert!((st.motion.value() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_anonymous_key() {
        let mut tr = tracker();
        let ev = tr.observe(&face(None, 0.0), t(0)).unwrap();
        assert_eq!(ev.anonymous_track_id.as_deref(), Some("anon@cam-1"));
        assert_eq!(ev.employee_id, None);
    }

    #[test]
    fn test_sweep_marks_away_once() {
        let mut tr = tracker();
        tr.observe(&face(Some("e1"), 0.0), t(0));

        assert!(tr.sweep_absent(t(60)).is_empty());

        let events = tr.sweep_absent(t(120));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, BehaviorStatus::Away);
        assert_eq!(events[0].payload["reason"], "left_frame");
        assert_eq!(events[0].confidence, 0.0);

        assert!(tr.sweep_absent(t(130)).is_empty());
    }

    #[test]
    fn test_return_after_sweep_takes_fast_path() {
        let mut tr = tracker();
        tr.observe(&face(Some("e1"), 0.0), t(0));
        tr.sweep_absent(t(130));
        let ev = tr.observe(&face(Some("e1"), 0.0), t(140)).unwrap();
        assert_eq!(ev.event, BehaviorStatus::Idle);
        assert_eq!(ev.payload["rule"], "B006_RETURN_IDLE");
    }

    #[test]
    fn test_empty_frame_routes_to_sweep() {
        let mut tr = tracker();
        tr.observe(&face(Some("e1"), 0.0), t(0));
        let frame = FrameSample { ts: t(121), source_id: "cam-1".into(), faces: vec![] };
        let events = tr.observe_frame(&frame);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, BehaviorStatus::Away);
    }

    #[test]
    fn test_prune_drops_stale_subjects() {
        let mut tr = tracker();
        tr.observe(&face(Some("e1"), 0.0), t(0));
        tr.observe(&face(Some("e2"), 0.0), t(500));
        assert_eq!(tr.prune(t(700), 600), 1);
        assert_eq!(tr.len(), 1);
        assert!(tr.subject("e2@cam-1").is_some());
    }
}
