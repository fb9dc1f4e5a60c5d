//! Per-zone hysteresis cache
//!
//! One store per process. Each zone has its own lock, held across the whole
//! read-modify-write of its `ZoneState`, so concurrent evaluations of the
//! same zone serialize while different zones proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::types::ZoneState;

type Slot = Arc<Mutex<Option<ZoneState>>>;

#[derive(Debug, Default)]
pub struct ZoneStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, zone_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(zone_id.to_string()).or_default().clone()
    }

    /// Run `update` with the zone's previous state under the zone's lock and
    /// store the state it returns.
    pub fn with_zone<R>(
        &self,
        zone_id: &str,
        update: impl FnOnce(Option<&ZoneState>) -> (ZoneState, R),
    ) -> R {
        let slot = self.slot(zone_id);
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        let (next, out) = update(guard.as_ref());
        *guard = Some(next);
        out
    }

    pub fn get(&self, zone_id: &str) -> Option<ZoneState> {
        let slot = self.slots.lock().unwrap_or_else(|e| e.into_inner()).get(zone_id).cloned()?;
        let state = *slot.lock().unwrap_or_else(|e| e.into_inner());
        state
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
