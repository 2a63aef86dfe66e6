//! Error types for the audit crate.
//!
//! Audit failures never surface to the code being audited. The emitting
//! paths catch these errors, report them on the `scribe_audit` tracing
//! target, and return normally; only explicit lookups such as
//! [`crate::AuditContext::current`] and sink construction hand them to the
//! caller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A context lookup ran outside any active request boundary.
    #[error("no active audit context for this task or thread")]
    NoActiveContext,

    /// A sink rejected a write.
    #[error("sink write failed: {0}")]
    Sink(#[from] SinkWriteError),
}

/// Errors raised by [`crate::AuditSink`] implementations.
#[derive(Debug, Error)]
pub enum SinkWriteError {
    /// Failed to open or create a log file.
    #[error("failed to open audit file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to append to the destination.
    #[error("failed to append audit entry: {0}")]
    Write(#[from] std::io::Error),

    /// Failed to serialize an entry.
    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}
