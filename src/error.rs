//! Typed failures surfaced by the I/O log writer.
//!
//! Every fallible entry point in this crate returns [`IoLogResult`]. Errors are never
//! swallowed internally: a failure here always means the caller's session must be torn
//! down (see the crate-level docs for the teardown contract).

use std::io;
use std::path::PathBuf;

use crate::timing::StreamId;

/// Convenience alias used throughout the crate.
pub type IoLogResult<T> = Result<T, IoLogError>;

/// All failure modes the I/O log writer can report.
#[derive(thiserror::Error, Debug)]
pub enum IoLogError {
    /// A client-supplied record did not parse as a timing line.
    #[error("malformed timing record: {reason}")]
    FormatInvalid {
        /// Human-readable description of what was wrong with the line.
        reason: String,
    },

    /// A timing record would have encoded to more than 1024 bytes.
    #[error("timing record for stream {stream:?} would exceed the 1024-byte format limit")]
    FormatOverflow {
        /// The stream the oversize record was being written for.
        stream: StreamId,
    },

    /// The session directory (or an intermediate component of it) could not be created or
    /// opened.
    #[error("session storage unavailable at {path}: {source}")]
    StorageUnavailable {
        /// Path of the directory that could not be created/opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A write, seek, or truncate failed mid-session.
    #[error("write to {stream:?} failed: {source}")]
    StorageWriteFailed {
        /// The stream the failing operation targeted.
        stream: StreamId,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A stream id outside `{0..4}` was requested for a data append.
    #[error("stream id {0:?} is not a valid data stream")]
    InvalidStream(StreamId),

    /// The timing file could not be aligned exactly to the requested resume instant.
    #[error("resume point mismatch: target {target:?}, replay landed on {reached:?}")]
    RestartMismatch {
        /// The instant the client asked to resume from.
        target: crate::timing::ElapsedTime,
        /// The instant replay actually reached before overshooting.
        reached: crate::timing::ElapsedTime,
    },

    /// Restart cannot proceed: a referenced stream is missing, or the timing file ran out
    /// before the target was reached, or a record failed to decode.
    #[error("session log is not usable for restart: {reason}")]
    RestartUnusable {
        /// Human-readable description of why the log could not be replayed.
        reason: String,
    },
}

impl IoLogError {
    pub(crate) fn storage_unavailable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IoLogError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_failed(stream: StreamId, source: io::Error) -> Self {
        IoLogError::StorageWriteFailed { stream, source }
    }
}
