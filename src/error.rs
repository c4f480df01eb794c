use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{Phase, RoundId, WorkerId};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel disconnected: {0}")]
    Disconnected(String),

    #[error("malformed message on '{topic}': {message}")]
    Malformed { topic: String, message: String },
}

impl ChannelError {
    /// Only a lost connection is worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Disconnected(_))
    }
}

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid trainer configuration: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to write model to '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode model: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("operation not allowed in phase {phase:?} (round {round})")]
    InvalidPhase { phase: Phase, round: RoundId },

    #[error("round {0} has already been decided")]
    AlreadyDecided(RoundId),

    #[error("only {registered} of {required} workers registered within {waited:?}")]
    RegistrationTimeout {
        registered: usize,
        required: usize,
        waited: Duration,
    },

    #[error("selection for round {round} stayed empty after {attempts} attempts")]
    EmptySelection { round: RoundId, attempts: u32 },

    #[error("aggregation failed in round {round}: {message}")]
    Aggregation { round: RoundId, message: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker {worker} received an unexpected event in state {state}")]
    InvalidTransition { worker: WorkerId, state: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config extension for '{0}' (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown {kind} '{name}'")]
    UnknownCapability { kind: &'static str, name: String },
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read log '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("coordinator log not found in '{0}'")]
    MissingCoordinatorLog(PathBuf),

    #[error("invalid event line pattern: {0}")]
    Pattern(#[from] regex::Error),
}
