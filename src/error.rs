//! Error types
//!
//! Only configuration and input plumbing can fail. The evaluation entry
//! points never return errors; missing data is a state, not a failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy document {} is not valid JSON: {source}", path.display())]
    PolicyParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("presence snapshot {} is not valid JSON: {source}", path.display())]
    SnapshotParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {source}")]
    InputParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
