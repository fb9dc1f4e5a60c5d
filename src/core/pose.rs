//! Single-frame posture from BlazePose landmarks
//!
//! Diagnostic only: the result goes into presence payloads and never
//! changes a behavior status.

use serde::{Deserialize, Serialize};

use crate::types::PoseLandmark;

const L_SHOULDER: usize = 11;
const R_SHOULDER: usize = 12;
const L_HIP: usize = 23;
const R_HIP: usize = 24;
const L_KNEE: usize = 25;
const R_KNEE: usize = 26;
const L_ANKLE: usize = 27;
const R_ANKLE: usize = 28;

const REQUIRED_LANDMARKS: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseState {
    Standing,
    Sitting,
    Unknown,
}

impl PoseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoseState::Standing => "standing",
            PoseState::Sitting => "sitting",
            PoseState::Unknown => "unknown",
        }
    }
}

fn avg_y(lm: &[PoseLandmark], a: usize, b: usize) -> f64 {
    (lm[a].y + lm[b].y) / 2.0
}

/// Classify posture; confidence is the mean visibility of the leg and torso joints
pub fn classify_pose(landmarks: Option<&[PoseLandmark]>, visibility_threshold: f64) -> (PoseState, f64) {
    let lm = match landmarks {
        Some(lm) if lm.len() >= REQUIRED_LANDMARKS => lm,
        _ => return (PoseState::Unknown, 0.0),
    };

    let joints = [L_SHOULDER, R_SHOULDER, L_HIP, R_HIP, L_KNEE, R_KNEE, L_ANKLE, R_ANKLE];
    let conf = joints.iter().map(|&i| lm[i].visibility.max(0.0)).sum::<f64>() / joints.len() as f64;
    if conf < visibility_threshold {
        return (PoseState::Unknown, conf);
    }

    // y grows downward
    let hip = avg_y(lm, L_HIP, R_HIP);
    let hip_to_knee = avg_y(lm, L_KNEE, R_KNEE) - hip;
    let knee_to_ankle = avg_y(lm, L_ANKLE, R_ANKLE) - avg_y(lm, L_KNEE, R_KNEE);
    let shoulder_to_hip = hip - avg_y(lm, L_SHOULDER, R_SHOULDER);

    if hip_to_knee > 0.12 && knee_to_ankle > 0.10 && shoulder_to_hip > 0.10 {
        (PoseState::Standing, conf)
    } else if hip_to_knee.abs() < 0.08 && shoulder_to_hip > 0.08 {
        (PoseState::Sitting, conf)
    } else {
        (PoseState::Unknown, conf)
    }
}
