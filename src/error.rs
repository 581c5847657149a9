//! Error types for every failure category the clock distinguishes.
//!
//! None of these abort the engine: store and record errors are logged and
//! skipped, sink errors collapse to `false` at the sink boundary, and only
//! configuration errors are allowed to stop a binary at startup.

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Failures reading or writing a persisted file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("couldn't access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("couldn't parse {path}: {source}")]
    Env {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("couldn't serialize alarms: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Why a single persisted alarm record was skipped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not a section")]
    NotASection,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has unparsable value `{value}`")]
    Invalid { field: &'static str, value: String },

    #[error(transparent)]
    Alarm(#[from] AlarmError),
}

/// Invalid alarm definitions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlarmError {
    #[error("invalid time `{0}`, expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("intensity {0} is outside 0..=100")]
    IntensityOutOfRange(i64),

    #[error("duration must be a positive number of milliseconds, got {0}")]
    NonPositiveDuration(i64),

    #[error("advancing `{0}` overflows the calendar")]
    Overflow(String),
}

/// Transport level failures of the HTTP sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("not connected: api key or shocker id missing")]
    NotConnected,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control api answered {0}")]
    Status(reqwest::StatusCode),
}

/// Settings problems found at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tick interval of {tick_ms}ms is wider than the {window_ms}ms fire window")]
    TickTooCoarse { tick_ms: u64, window_ms: u64 },

    #[error("couldn't start the alarm clock thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("couldn't determine a home directory for openshock_clock")]
    NoProjectDirs,
}

/// One bad key in the headless environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),

    #[error("{key} {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// Every problem found while reading the headless environment.
#[derive(Debug, PartialEq, Eq)]
pub struct EnvErrors(pub Vec<EnvError>);

impl fmt::Display for EnvErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for EnvErrors {}
