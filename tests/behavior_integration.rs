//! Integration tests for presence behavior
//!
//! Tests the full path: face observations → tracker → behavior engine → presence events

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use zonewatch::core::{evaluate, evaluate_traced, SubjectTracker, TrackerConfig};
use zonewatch::types::{
    BehaviorConfig, BehaviorRule, BehaviorSignals, BehaviorState, BehaviorStatus, FaceObservation, FrameSample,
};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

fn moving() -> BehaviorSignals {
    BehaviorSignals::new(true, 5.0, 2.0)
}

fn still() -> BehaviorSignals {
    BehaviorSignals::new(true, 0.0, 2.0)
}

fn face(x: f64) -> FaceObservation {
    FaceObservation {
        subject_id: Some("e7".into()),
        match_score: 0.88,
        det_score: 0.97,
        bbox: [x, 100.0, x + 80.0, 180.0],
        role: Some("operator".into()),
        landmarks: None,
    }
}

fn frame(at: i64, faces: Vec<FaceObservation>) -> FrameSample {
    FrameSample { ts: t(at), source_id: "cam-3".into(), faces }
}

/// Sustained motion confirms ACTIVE at t=31
#[test]
fn test_active_confirmed_after_sustained_motion() {
    let config = BehaviorConfig::default();
    let mut state = BehaviorState::new();

    for at in [0, 10, 20] {
        let decision = evaluate_traced(&config, &mut state, &moving(), t(at));
        assert_ne!(decision.rule, BehaviorRule::B003_ACTIVE_CONFIRMED, "confirmed too early at t={}", at);
    }
    let decision = evaluate_traced(&config, &mut state, &moving(), t(31));
    assert_eq!(decision.status, BehaviorStatus::Active);
    assert_eq!(decision.rule, BehaviorRule::B003_ACTIVE_CONFIRMED);
    assert_eq!(decision.motion_active_secs, 31.0);
}

/// Once absence reaches the away window, motion history is irrelevant
#[test]
fn test_away_dominates_motion_history() {
    let config = BehaviorConfig::default();
    let mut state = BehaviorState::new();
    for at in (0..=40).step_by(10) {
        evaluate(&config, &mut state, &moving(), t(at));
    }
    evaluate(&config, &mut state, &BehaviorSignals::absent(), t(50));
    let decision = evaluate_traced(&config, &mut state, &BehaviorSignals::absent(), t(170));
    assert_eq!(decision.status, BehaviorStatus::Away);
    assert_eq!(decision.rule, BehaviorRule::B001_AWAY_CONFIRMED);
    assert_eq!(decision.no_face_secs, 120.0);
}

/// A brief pause does not knock an active subject down to idle
#[test]
fn test_active_is_sticky() {
    let config = BehaviorConfig::default();
    let mut state = BehaviorState::new();
    for at in [0, 10, 20, 31] {
        evaluate(&config, &mut state, &moving(), t(at));
    }
    assert_eq!(evaluate(&config, &mut state, &still(), t(35)), BehaviorStatus::Active);
    assert_eq!(evaluate(&config, &mut state, &still(), t(94)), BehaviorStatus::Active);
    assert_eq!(evaluate(&config, &mut state, &still(), t(95)), BehaviorStatus::Idle);
}

/// Returning from away with motion is immediately active
#[test]
fn test_return_from_away_is_optimistic() {
    let config = BehaviorConfig::default();
    let mut state = BehaviorState::new();
    evaluate(&config, &mut state, &still(), t(0));
    evaluate(&config, &mut state, &BehaviorSignals::absent(), t(1));
    assert_eq!(evaluate(&config, &mut state, &BehaviorSignals::absent(), t(200)), BehaviorStatus::Away);

    let decision = evaluate_traced(&config, &mut state, &moving(), t(201));
    assert_eq!(decision.status, BehaviorStatus::Active);
    assert_eq!(decision.rule, BehaviorRule::B005_RETURN_ACTIVE);
}

/// Tracker: first sighting, heartbeat throttle, away sweep, return
#[test]
fn test_tracker_lifecycle() {
    let mut tracker = SubjectTracker::new("cam-3", TrackerConfig::default());

    let first = tracker.observe_frame(&frame(0, vec![face(100.0)]));
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].event, BehaviorStatus::Idle);
    assert_eq!(first[0].employee_id.as_deref(), Some("e7"));
    assert_eq!(first[0].payload["role"], "operator");
    assert_eq!(first[0].payload["pose_state"], "unknown");

    // Unchanged status inside the heartbeat window stays quiet
    assert!(tracker.observe_frame(&frame(2, vec![face(100.0)])).is_empty());
    assert_eq!(tracker.observe_frame(&frame(5, vec![face(100.0)])).len(), 1);

    // Not yet gone long enough
    assert!(tracker.observe_frame(&frame(60, vec![])).is_empty());

    let away = tracker.observe_frame(&frame(125, vec![]));
    assert_eq!(away.len(), 1);
    assert_eq!(away[0].event, BehaviorStatus::Away);
    assert_eq!(away[0].confidence, 0.0);
    assert_eq!(away[0].payload["reason"], "left_frame");

    // Away is sent once
    assert!(tracker.observe_frame(&frame(130, vec![])).is_empty());

    let back = tracker.observe_frame(&frame(140, vec![face(100.0)]));
    assert_eq!(back.len(), 1);
    assert_ne!(back[0].event, BehaviorStatus::Away);
}

/// Subjects unseen past retention are forgotten
#[test]
fn test_tracker_prunes_after_retention() {
    let mut tracker = SubjectTracker::new("cam-3", TrackerConfig::default());
    tracker.observe_frame(&frame(0, vec![face(100.0)]));
    assert_eq!(tracker.prune(t(600), 600), 0);
    assert_eq!(tracker.prune(t(601), 600), 1);
    assert!(tracker.is_empty());
}
