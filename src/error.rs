//! Error taxonomy of the save core.
//!
//! Library code returns `SaveResult<T>`; the orchestrator wraps failures into
//! `OpError`, which additionally names the request stage that failed.
//! The CLI and integration tests sit on top with `anyhow`.

use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveError {
    /// Payload bytes are truncated, malformed or fail their checksum.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// The slot file itself is damaged (magic, header checksum, length).
    #[error("slot {slot} corrupted: {reason}")]
    SlotCorrupted { slot: String, reason: String },

    #[error("slot {0} not found")]
    SlotNotFound(String),

    #[error("no migration path for '{type_name}' {from} -> {to}: step from v{missing} is not registered")]
    NoMigrationPath {
        type_name: String,
        from: u32,
        to: u32,
        missing: u32,
    },

    #[error("'{type_name}' payload has schema v{found}, this build understands up to v{supported}")]
    UnsupportedFutureVersion {
        type_name: String,
        found: u32,
        supported: u32,
    },

    #[error("migration of '{type_name}' from v{from} failed: {reason}")]
    MigrationFailed {
        type_name: String,
        from: u32,
        reason: String,
    },

    #[error("slot {slot} holds schema v{existing}, refusing to overwrite with v{attempted}")]
    VersionRegression {
        slot: String,
        existing: u32,
        attempted: u32,
    },

    #[error("payload holds '{found}', expected '{expected}'")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid slot name '{0}' (1..=64 chars of [A-Za-z0-9_-])")]
    InvalidSlotName(String),

    #[error("value cannot be encoded: {0}")]
    Unencodable(String),

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("orchestrator is shut down")]
    Shutdown,
}

pub type SaveResult<T> = std::result::Result<T, SaveError>;

impl SaveError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SaveError::CorruptPayload(msg.into())
    }

    pub fn slot_corrupted(slot: impl fmt::Display, reason: impl Into<String>) -> Self {
        SaveError::SlotCorrupted {
            slot: slot.to_string(),
            reason: reason.into(),
        }
    }

    /// Corruption of either the payload or the slot file (candidates for backup fallback).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SaveError::CorruptPayload(_) | SaveError::SlotCorrupted { .. }
        )
    }
}

/// Transient I/O kinds that are worth a retry on read.
pub fn is_transient_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Lifecycle of an orchestrated request. Non-terminal states double as the
/// stage reported by `OpError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpState {
    Pending,
    Resolving,
    Serializing,
    Deserializing,
    Persisting,
    Migrating,
    Completed,
    Failed,
    Cancelled,
}

impl OpState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OpState::Completed | OpState::Failed | OpState::Cancelled)
    }
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpState::Pending => "pending",
            OpState::Resolving => "resolving",
            OpState::Serializing => "serializing",
            OpState::Deserializing => "deserializing",
            OpState::Persisting => "persisting",
            OpState::Migrating => "migrating",
            OpState::Completed => "completed",
            OpState::Failed => "failed",
            OpState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Failure of an orchestrated request: the stage it failed in plus the cause.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {kind}")]
pub struct OpError {
    pub stage: OpState,
    #[source]
    pub kind: SaveError,
}

impl OpError {
    pub fn new(stage: OpState, kind: SaveError) -> Self {
        Self { stage, kind }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, SaveError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_error_names_stage_and_cause() {
        let e = OpError::new(OpState::Persisting, SaveError::SlotNotFound("slot1".into()));
        let msg = e.to_string();
        assert!(msg.contains("persisting"), "{msg}");
        assert!(msg.contains("slot1"), "{msg}");
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn transient_kinds() {
        assert!(is_transient_io(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient_io(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
