//! Latest presence per subject: the bridge from behavior output to
//! compliance input

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::types::{BehaviorStatus, PresenceEvent, PresenceRecord};

/// Anything that can produce a presence snapshot for the compliance engine
pub trait PresenceSource: Send + Sync {
    /// One record per subject seen at or after `since`
    fn current_presence(&self, since: DateTime<Utc>) -> Vec<PresenceRecord>;

    /// Drop what can no longer be counted; returns how many subjects went.
    /// Fixed snapshots keep everything.
    fn prune_before(&self, _cutoff: DateTime<Utc>) -> usize {
        0
    }
}

/// Reduce an event stream to the latest event per subject, newest first.
///
/// Events before `since` are ignored. Subjects whose latest event is AWAY
/// have left and are not counted.
pub fn latest_per_subject<'a, I>(events: I, since: DateTime<Utc>) -> Vec<PresenceRecord>
where
    I: IntoIterator<Item = &'a PresenceEvent>,
{
    let mut latest: HashMap<&str, &PresenceEvent> = HashMap::new();
    for ev in events.into_iter().filter(|e| e.ts >= since) {
        let slot = latest.entry(ev.subject_key()).or_insert(ev);
        if ev.ts >= slot.ts {
            *slot = ev;
        }
    }

    let mut out: Vec<PresenceRecord> = latest
        .into_values()
        // Intentional: a subject whose latest event is away is not counted
        .filter(|e| e.event != BehaviorStatus::Away)
        .map(PresenceEvent::to_record)
        .collect();
    out.sort_by(|a, b| b.last_seen_ts.cmp(&a.last_seen_ts).then_with(|| a.subject.cmp(&b.subject)));
    out
}

/// Parse a JSON array of presence records.
///
/// Only a document that is not a JSON array is an error. Elements that do
/// not fit the record shape are logged and skipped.
pub fn parse_snapshot(text: &str) -> serde_json::Result<Vec<PresenceRecord>> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<PresenceRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed presence record");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Shared store of the latest event per subject, written by source workers
/// and read by the compliance ticker
#[derive(Debug, Default)]
pub struct PresenceLog {
    latest: RwLock<HashMap<String, PresenceEvent>>,
}

impl PresenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event; an older event never replaces a newer one
    pub fn record(&self, event: PresenceEvent) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        let newer_exists = latest
            .get(event.subject_key())
            .is_some_and(|existing| existing.ts > event.ts);
        if !newer_exists {
            latest.insert(event.subject_key().to_string(), event);
        }
    }

    pub fn len(&self) -> usize {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PresenceSource for PresenceLog {
    fn current_presence(&self, since: DateTime<Utc>) -> Vec<PresenceRecord> {
        let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
        latest_per_subject(latest.values(), since)
    }

    /// Forget subjects whose latest event is older than `cutoff`
    fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        let before = latest.len();
        latest.retain(|_, ev| ev.ts >= cutoff);
        before - latest.len()
    }
}

/// A fixed snapshot, for one-shot evaluation
impl PresenceSource for Vec<PresenceRecord> {
    fn current_presence(&self, since: DateTime<Utc>) -> Vec<PresenceRecord> {
        self.iter()
            .filter(|r| r.last_seen_ts.is_some_and(|ts| ts >= since))
            .cloned()
            .collect()
    }
}
