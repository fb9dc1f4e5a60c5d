//! Presence contracts: what the vision layer hands us, what we hand on

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::BehaviorStatus;
use crate::{ROLE_KEYS, UNKNOWN_ROLE};

/// One pose landmark, normalized image coordinates (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseLandmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub visibility: f64,
}

/// A detected face as delivered by the vision/identity layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Resolved identity, None for an unmatched face
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub det_score: f64,
    /// x1, y1, x2, y2
    pub bbox: [f64; 4],
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub landmarks: Option<Vec<PoseLandmark>>,
}

impl FaceObservation {
    pub fn center(&self) -> (f64, f64) {
        let [x1, y1, x2, y2] = self.bbox;
        ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }

    pub fn area(&self) -> f64 {
        let [x1, y1, x2, y2] = self.bbox;
        (x2 - x1) * (y2 - y1)
    }
}

/// One sampled frame from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub ts: DateTime<Utc>,
    pub source_id: String,
    #[serde(default)]
    pub faces: Vec<FaceObservation>,
}

impl FrameSample {
    /// The face the tracker follows: largest bounding box
    pub fn primary_face(&self) -> Option<&FaceObservation> {
        self.faces
            .iter()
            .max_by(|a, b| a.area().partial_cmp(&b.area()).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Behavior output for one subject, as sent downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub ts: DateTime<Utc>,
    pub employee_id: Option<String>,
    pub anonymous_track_id: Option<String>,
    pub source_id: String,
    pub event: BehaviorStatus,
    /// Opaque to the engines (detector score)
    pub confidence: f64,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl PresenceEvent {
    /// Employee id, else anonymous track, else "unknown"
    pub fn subject_key(&self) -> &str {
        self.employee_id
            .as_deref()
            .or(self.anonymous_track_id.as_deref())
            .unwrap_or(UNKNOWN_ROLE)
    }

    /// Collapse into the record shape the compliance engine reads
    pub fn to_record(&self) -> PresenceRecord {
        PresenceRecord {
            subject: self.subject_key().to_string(),
            source_id: Some(self.source_id.clone()),
            last_seen_ts: Some(self.ts),
            payload: self.payload.clone(),
        }
    }
}

fn unknown_subject() -> String {
    UNKNOWN_ROLE.to_string()
}

/// An unparseable timestamp reads as missing rather than failing the record
fn lenient_ts<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s.parse::<DateTime<Utc>>().ok(),
        _ => None,
    })
}

/// Latest known presence of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    #[serde(default = "unknown_subject")]
    pub subject: String,
    #[serde(default)]
    pub source_id: Option<String>,
    /// Missing or malformed timestamp means the record is treated as absent
    #[serde(default, deserialize_with = "lenient_ts")]
    pub last_seen_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl PresenceRecord {
    pub fn new(subject: impl Into<String>, source_id: impl Into<String>, last_seen_ts: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            source_id: Some(source_id.into()),
            last_seen_ts: Some(last_seen_ts),
            payload: Map::new(),
        }
    }

    /// Builder: set the role payload field
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.payload.insert("role".to_string(), Value::String(role.into()));
        self
    }

    /// First non-empty of `role`, `staff_role`, `entity_role`
    pub fn role(&self) -> Option<String> {
        ROLE_KEYS.iter().find_map(|key| match self.payload.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Role, or "unknown"
    pub fn role_or_unknown(&self) -> String {
        self.role().unwrap_or_else(|| UNKNOWN_ROLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(payload: Value) -> PresenceRecord {
        PresenceRecord {
            subject: "s1".into(),
            source_id: Some("cam".into()),
            last_seen_ts: Some(Utc::now()),
            payload: payload.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_role_key_order() {
        let r = record_with(json!({"entity_role": "visitor", "staff_role": "guard"}));
        assert_eq!(r.role().as_deref(), Some("guard"));

        let r = record_with(json!({"role": "", "entity_role": "visitor"}));
        assert_eq!(r.role().as_deref(), Some("visitor"));
    }

    #[test]
    fn test_role_missing_defaults_unknown() {
        let r = record_with(json!({"role": null, "other": 1}));
        assert_eq!(r.role(), None);
        assert_eq!(r.role_or_unknown(), "unknown");
    }

    #[test]
    fn test_record_tolerates_missing_fields() {
        let r: PresenceRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(r.subject, "unknown");
        assert!(r.last_seen_ts.is_none());
        assert!(r.source_id.is_none());
    }

    #[test]
    fn test_bad_timestamp_reads_as_absent() {
        let r: PresenceRecord =
            serde_json::from_value(json!({"subject": "s1", "source_id": "cam", "last_seen_ts": "yesterday"})).unwrap();
        assert!(r.last_seen_ts.is_none());

        let r: PresenceRecord = serde_json::from_value(json!({"last_seen_ts": 1700000000})).unwrap();
        assert!(r.last_seen_ts.is_none());

        let r: PresenceRecord = serde_json::from_value(json!({"last_seen_ts": "2023-11-14T22:13:20Z"})).unwrap();
        assert_eq!(r.last_seen_ts.map(|ts| ts.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_primary_face_is_largest() {
        let small = FaceObservation {
            subject_id: Some("a".into()),
            match_score: 0.9,
            det_score: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
            role: None,
            landmarks: None,
        };
        let big = FaceObservation { subject_id: Some("b".into()), bbox: [0.0, 0.0, 50.0, 40.0], ..small.clone() };
        let frame = FrameSample { ts: Utc::now(), source_id: "cam".into(), faces: vec![small, big] };
        assert_eq!(frame.primary_face().unwrap().subject_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_subject_key_fallbacks() {
        let ev = PresenceEvent {
            ts: Utc::now(),
            employee_id: None,
            anonymous_track_id: Some("anon@cam".into()),
            source_id: "cam".into(),
            event: BehaviorStatus::Idle,
            confidence: 0.5,
            payload: Map::new(),
        };
        assert_eq!(ev.subject_key(), "anon@cam");
        assert_eq!(ev.to_record().subject, "anon@cam");
    }
}
