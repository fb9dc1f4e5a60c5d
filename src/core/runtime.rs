//! Runtime wiring
//!
//! - One task per source owns that source's `SubjectTracker`, fed frames over mpsc
//! - Source workers write presence events into a shared `PresenceLog`
//! - A ticker evaluates compliance on a fixed period until shutdown
//! - `Replay` drives the same pipeline from recorded frames on sample time

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::compliance::ComplianceEngine;
use crate::core::presence::{PresenceLog, PresenceSource};
use crate::core::tracker::{SubjectTracker, TrackerConfig};
use crate::types::{ComplianceEvent, ComplianceResult, FrameSample, PresenceEvent};
use crate::MAX_WINDOW_SECS;

/// Where compliance results go after each evaluation
pub trait ComplianceSink: Send + Sync {
    fn publish(&self, result: &ComplianceResult);
}

/// Fans compliance events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ComplianceEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ComplianceEvent> {
        self.tx.subscribe()
    }
}

impl ComplianceSink for BroadcastSink {
    fn publish(&self, result: &ComplianceResult) {
        for event in &result.events {
            // No subscribers is not an error
            let _ = self.tx.send(event.clone());
        }
    }
}

// =============================================================================
// SOURCE WORKER
// =============================================================================

/// Owns one source's tracker; the only writer of that source's subjects
#[derive(Debug)]
pub struct SourceWorker {
    tracker: SubjectTracker,
    log: Arc<PresenceLog>,
    events: Option<broadcast::Sender<PresenceEvent>>,
    retention_secs: u64,
}

impl SourceWorker {
    pub fn new(source_id: impl Into<String>, config: TrackerConfig, retention_secs: u64, log: Arc<PresenceLog>) -> Self {
        Self {
            tracker: SubjectTracker::new(source_id, config),
            log,
            events: None,
            retention_secs,
        }
    }

    /// Also publish every presence event on `tx`
    pub fn with_events(mut self, tx: broadcast::Sender<PresenceEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn source_id(&self) -> &str {
        self.tracker.source_id()
    }

    pub fn tracker(&self) -> &SubjectTracker {
        &self.tracker
    }

    /// Process one frame and return the presence events it produced
    pub fn handle(&mut self, frame: &FrameSample) -> Vec<PresenceEvent> {
        if frame.source_id != self.tracker.source_id() {
            warn!(expected = %self.tracker.source_id(), got = %frame.source_id, "frame routed to wrong source");
            return Vec::new();
        }

        let events = self.tracker.observe_frame(frame);
        for event in &events {
            self.log.record(event.clone());
            if let Some(tx) = &self.events {
                let _ = tx.send(event.clone());
            }
        }
        self.tracker.prune(frame.ts, self.retention_secs);
        events
    }

    /// Consume frames until every sender is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<FrameSample>) -> SubjectTracker {
        info!(source = %self.source_id(), "source worker started");
        while let Some(frame) = rx.recv().await {
            let events = self.handle(&frame);
            debug!(source = %self.source_id(), emitted = events.len(), "frame processed");
        }
        info!(source = %self.source_id(), "source worker stopped");
        self.tracker
    }
}

/// Spawn `worker` on the runtime; drop the sender to stop it
pub fn spawn_source_worker(worker: SourceWorker, capacity: usize) -> (mpsc::Sender<FrameSample>, JoinHandle<SubjectTracker>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, tokio::spawn(worker.run(rx)))
}

// =============================================================================
// COMPLIANCE TICKER
// =============================================================================

/// Evaluate compliance every `period` until `shutdown` turns true or its
/// sender goes away. Returns the number of evaluations run.
pub async fn run_compliance_ticker(
    engine: Arc<ComplianceEngine>,
    source: Arc<dyn PresenceSource>,
    sink: Arc<dyn ComplianceSink>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    info!(period_ms = period.as_millis() as u64, zones = engine.model().zones().len(), "compliance ticker started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let result = engine.evaluate_source(source.as_ref(), now);
                sink.publish(&result);
                let pruned = source.prune_before(engine.presence_cutoff(now));
                ticks += 1;
                debug!(tick = ticks, violating = result.violating().count(), pruned, "compliance tick");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(ticks, "compliance ticker stopped");
    ticks
}

// =============================================================================
// REPLAY
// =============================================================================

/// One line of replay output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplayOutput {
    Presence(PresenceEvent),
    Compliance(ComplianceEvent),
}

/// Deterministic offline pipeline: frames in sample-time order, compliance
/// evaluated every tick of sample time.
#[derive(Debug)]
pub struct Replay {
    config: TrackerConfig,
    retention_secs: u64,
    tick: chrono::Duration,
    engine: Option<ComplianceEngine>,
    trackers: BTreeMap<String, SubjectTracker>,
    log: PresenceLog,
    next_tick: Option<DateTime<Utc>>,
    last_ts: Option<DateTime<Utc>>,
}

impl Replay {
    /// Behavior-only replay when `engine` is None
    pub fn new(config: TrackerConfig, retention_secs: u64, tick_secs: u64, engine: Option<ComplianceEngine>) -> Self {
        let tick_secs = i64::try_from(tick_secs).unwrap_or(i64::MAX).clamp(1, MAX_WINDOW_SECS as i64);
        Self {
            config,
            retention_secs,
            tick: chrono::Duration::seconds(tick_secs),
            engine,
            trackers: BTreeMap::new(),
            log: PresenceLog::new(),
            next_tick: None,
            last_ts: None,
        }
    }

    pub fn engine(&self) -> Option<&ComplianceEngine> {
        self.engine.as_ref()
    }

    pub fn presence(&self) -> &PresenceLog {
        &self.log
    }

    pub fn tracker(&self, source_id: &str) -> Option<&SubjectTracker> {
        self.trackers.get(source_id)
    }

    /// Feed one frame. Ticks due before the frame run first; ticks due at
    /// the frame's instant run after it, so they see it.
    pub fn push(&mut self, frame: &FrameSample) -> Vec<ReplayOutput> {
        let mut out = Vec::new();
        self.run_ticks(frame.ts, false, &mut out);

        let config = self.config;
        let tracker = self
            .trackers
            .entry(frame.source_id.clone())
            .or_insert_with(|| SubjectTracker::new(frame.source_id.clone(), config));
        let events = tracker.observe_frame(frame);
        tracker.prune(frame.ts, self.retention_secs);

        for event in events {
            self.log.record(event.clone());
            out.push(ReplayOutput::Presence(event));
        }
        self.last_ts = Some(self.last_ts.map_or(frame.ts, |ts| ts.max(frame.ts)));

        self.run_ticks(frame.ts, true, &mut out);
        out
    }

    /// Final evaluation at the last frame's instant, unless a tick already ran there
    pub fn finish(&mut self) -> Vec<ReplayOutput> {
        let mut out = Vec::new();
        let (Some(engine), Some(last)) = (&self.engine, self.last_ts) else {
            return out;
        };
        let last_tick = self.next_tick.map(|next| next - self.tick);
        if last_tick != Some(last) {
            let result = engine.evaluate_source(&self.log, last);
            out.extend(result.events.into_iter().map(ReplayOutput::Compliance));
        }
        out
    }

    fn run_ticks(&mut self, now: DateTime<Utc>, inclusive: bool, out: &mut Vec<ReplayOutput>) {
        let Some(engine) = &self.engine else {
            return;
        };
        let next = self.next_tick.get_or_insert(now);
        while *next < now || (inclusive && *next == now) {
            let result = engine.evaluate_source(&self.log, *next);
            out.extend(result.events.into_iter().map(ReplayOutput::Compliance));
            self.log.prune_before(engine.presence_cutoff(*next));
            *next += self.tick;
        }
    }
}
