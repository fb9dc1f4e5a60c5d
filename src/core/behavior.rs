//! Behavior state machine: active / idle / away per subject
//!
//! Rules, first match wins:
//! - no face ≥ away window                      → AWAY
//! - face, no motion ≥ idle window              → IDLE
//! - face, motion ≥ active-confirm window       → ACTIVE
//! - face, previous ACTIVE/IDLE                 → held
//! - face, previous AWAY                        → ACTIVE if moving else IDLE
//! - face, cold start                           → ACTIVE if moving else IDLE
//! - no face                                    → AWAY
//!
//! Mealy machine: the output is written back to `last_state` for the next tick.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::debounce::{elapsed_secs, track};
use crate::types::{BehaviorConfig, BehaviorDecision, BehaviorRule, BehaviorSignals, BehaviorState, BehaviorStatus};

/// Evaluate one tick, returning only the status
pub fn evaluate(
    config: &BehaviorConfig,
    state: &mut BehaviorState,
    signals: &BehaviorSignals,
    now: DateTime<Utc>,
) -> BehaviorStatus {
    evaluate_traced(config, state, signals, now).status
}

/// Evaluate one tick, returning the status with the rule that produced it
pub fn evaluate_traced(
    config: &BehaviorConfig,
    state: &mut BehaviorState,
    signals: &BehaviorSignals,
    now: DateTime<Utc>,
) -> BehaviorDecision {
    let moving = signals.motion_active();

    track(signals.face_present, now, &mut state.face_present_since, &mut state.no_face_since);
    if signals.face_present {
        track(moving, now, &mut state.motion_active_since, &mut state.no_motion_since);
    } else {
        // No motion judgment without a face
        state.motion_active_since = None;
        state.no_motion_since = None;
    }

    let no_face_secs = elapsed_secs(now, state.no_face_since);
    let no_motion_secs = elapsed_secs(now, state.no_motion_since);
    let motion_active_secs = elapsed_secs(now, state.motion_active_since);

    let (status, rule) = decide(
        config,
        state.last_state,
        signals.face_present,
        moving,
        no_face_secs,
        no_motion_secs,
        motion_active_secs,
    );

    if state.last_state != Some(status) {
        debug!(
            from = ?state.last_state,
            to = %status,
            rule = rule.code(),
            "behavior transition"
        );
    }
    state.last_state = Some(status);

    BehaviorDecision {
        status,
        rule,
        no_face_secs,
        no_motion_secs,
        motion_active_secs,
    }
}

/// Ordered rule list. Do not reorder: absence dominates, then confirmed
/// windows, then the cheap fallbacks.
fn decide(
    config: &BehaviorConfig,
    last: Option<BehaviorStatus>,
    face_present: bool,
    moving: bool,
    no_face_secs: f64,
    no_motion_secs: f64,
    motion_active_secs: f64,
) -> (BehaviorStatus, BehaviorRule) {
    use BehaviorStatus::{Active, Away, Idle};

    if no_face_secs >= config.away_secs as f64 {
        return (Away, BehaviorRule::B001_AWAY_CONFIRMED);
    }
    if face_present && no_motion_secs >= config.idle_secs as f64 {
        return (Idle, BehaviorRule::B002_IDLE_CONFIRMED);
    }
    if face_present && motion_active_secs >= config.active_confirm_secs as f64 {
        return (Active, BehaviorRule::B003_ACTIVE_CONFIRMED);
    }

    match (last, face_present) {
        (Some(held @ (Active | Idle)), true) => (held, BehaviorRule::B004_STATE_HELD),
        (Some(Away), true) if moving => (Active, BehaviorRule::B005_RETURN_ACTIVE),
        (Some(Away), true) => (Idle, BehaviorRule::B006_RETURN_IDLE),
        (None, true) if moving => (Active, BehaviorRule::B007_COLD_START_ACTIVE),
        (None, true) => (Idle, BehaviorRule::B008_COLD_START_IDLE),
        (_, false) => (Away, BehaviorRule::B009_NO_FACE),
    }
}

/// Behavior engine bound to one deployment's windows
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorEngine {
    config: BehaviorConfig,
}

impl BehaviorEngine {
    pub fn new(config: BehaviorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        state: &mut BehaviorState,
        signals: &BehaviorSignals,
        now: DateTime<Utc>,
    ) -> BehaviorDecision {
        evaluate_traced(&self.config, state, signals, now)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const THRESHOLD: f64 = 2.0;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn moving() -> BehaviorSignals {
        BehaviorSignals::new(true, 5.0, THRESHOLD)
    }

    fn still() -> BehaviorSignals {
        BehaviorSignals::new(true, 0.5, THRESHOLD)
    }

    fn cfg() -> BehaviorConfig {
        BehaviorConfig { active_confirm_secs: 30, idle_secs: 60, away_secs: 120 }
    }

    #[test]
    fn test_cold_start_moving_is_active() {
        let mut st = BehaviorState::new();
        let d = evaluate_traced(&cfg(), &mut st, &moving(), t(0));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(d.rule, BehaviorRule::B007_COLD_START_ACTIVE);
        assert_eq!(st.last_state, Some(BehaviorStatus::Active));
    }

    #[test]
    fn test_cold_start_still_is_idle() {
        let mut st = BehaviorState::new();
        let d = evaluate_traced(&cfg(), &mut st, &still(), t(0));
        assert_eq!(d.status, BehaviorStatus::Idle);
        assert_eq!(d.rule, BehaviorRule::B008_COLD_START_IDLE);
    }

    #[test]
    fn test_cold_start_no_face_is_away() {
        let mut st = BehaviorState::new();
        let d = evaluate_traced(&cfg(), &mut st, &BehaviorSignals::absent(), t(0));
        assert_eq!(d.status, BehaviorStatus::Away);
        assert_eq!(d.rule, BehaviorRule::B009_NO_FACE);
    }

    #[test]
    fn test_active_confirmed_after_window() {
        let mut st = BehaviorState::new();
        for s in [0, 10, 20] {
            evaluate(&cfg(), &mut st, &moving(), t(s));
        }
        let d = evaluate_traced(&cfg(), &mut st, &moving(), t(31));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(d.rule, BehaviorRule::B003_ACTIVE_CONFIRMED);
        assert_eq!(d.motion_active_secs, 31.0);
    }

    #[test]
    fn test_active_held_through_short_stillness() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &moving(), t(0));
        let d = evaluate_traced(&cfg(), &mut st, &still(), t(5));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(d.rule, BehaviorRule::B004_STATE_HELD);
    }

    #[test]
    fn test_idle_after_idle_window() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &moving(), t(0));
        evaluate(&cfg(), &mut st, &still(), t(10));
        assert_eq!(evaluate(&cfg(), &mut st, &still(), t(69)), BehaviorStatus::Active);
        let d = evaluate_traced(&cfg(), &mut st, &still(), t(70));
        assert_eq!(d.status, BehaviorStatus::Idle);
        assert_eq!(d.rule, BehaviorRule::B002_IDLE_CONFIRMED);
    }

    #[test]
    fn test_away_dominates_motion_history() {
        let mut st = BehaviorState::new();
        for s in 0..40 {
            evaluate(&cfg(), &mut st, &moving(), t(s));
        }
        evaluate(&cfg(), &mut st, &BehaviorSignals::absent(), t(40));
        let d = evaluate_traced(&cfg(), &mut st, &BehaviorSignals::absent(), t(160));
        assert_eq!(d.status, BehaviorStatus::Away);
        assert_eq!(d.rule, BehaviorRule::B001_AWAY_CONFIRMED);
        assert_eq!(d.no_face_secs, 120.0);
    }

    #[test]
    fn test_face_loss_clears_motion_markers() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &moving(), t(0));
        assert!(st.motion_active_since.is_some());
        evaluate(&cfg(), &mut st, &BehaviorSignals::absent(), t(1));
        assert!(st.motion_active_since.is_none());
        assert!(st.no_motion_since.is_none());
        assert!(st.face_present_since.is_none());
        assert_eq!(st.no_face_since, Some(t(1)));
    }

    #[test]
    fn test_return_from_away_moving_is_active() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &BehaviorSignals::absent(), t(0));
        let d = evaluate_traced(&cfg(), &mut st, &moving(), t(200));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(d.rule, BehaviorRule::B005_RETURN_ACTIVE);
    }

    #[test]
    fn test_return_from_away_still_is_idle() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &BehaviorSignals::absent(), t(0));
        let d = evaluate_traced(&cfg(), &mut st, &still(), t(200));
        assert_eq!(d.status, BehaviorStatus::Idle);
        assert_eq!(d.rule, BehaviorRule::B006_RETURN_IDLE);
    }

    #[test]
    fn test_return_needs_no_confirmation() {
        let mut st = BehaviorState::new();
        evaluate(&cfg(), &mut st, &BehaviorSignals::absent(), t(0));
        let d = evaluate_traced(&cfg(), &mut st, &moving(), t(1));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(d.motion_active_secs, 0.0);
    }

    #[test]
    fn test_engine_wraps_config() {
        let engine = BehaviorEngine::new(cfg());
        let mut st = BehaviorState::new();
        let d = engine.evaluate(&mut st, &moving(), t(0));
        assert_eq!(d.status, BehaviorStatus::Active);
        assert_eq!(engine.config().away_secs, 120);
    }
}
