use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building analyzer values or reading input.
#[derive(Debug, Error)]
pub enum Error {
    /// Query port outside 1-65535, or rule port literal outside 0-65535
    #[error("Invalid port in {field}: {value}")]
    InvalidPort { field: String, value: String },

    #[error("Unrecognized protocol: {0}")]
    InvalidProtocol(String),

    #[error("Unrecognized direction: {0}")]
    InvalidDirection(String),

    #[error("Unrecognized chain policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown input format: {0}")]
    UnknownFormat(String),

    /// A rule failed its construction invariants
    #[error("Invalid rule at line {line}: {reason}")]
    InvalidRule { line: usize, reason: String },

    /// Valid JSON whose top-level value is not a ruleset
    #[error("Unsupported JSON shape: {0}")]
    UnsupportedShape(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
