//! Decoded client events.
//!
//! Framing and wire decoding happen upstream of this crate; by the time an event reaches
//! the I/O log writer it is already one of these five variants. The core dispatches on the
//! tag rather than through any dynamic method lookup.

use crate::error::{IoLogError, IoLogResult};
use crate::timing::ElapsedTime;

/// Default `runuser` when a session-open record omits it.
pub const DEFAULT_RUNUSER: &str = "root";
/// Default `ttyname` when a session-open record omits it.
pub const DEFAULT_TTYNAME: &str = "unknown";
/// Default `cwd` when a session-open record omits it.
pub const DEFAULT_CWD: &str = "unknown";
/// Default terminal row count.
pub const DEFAULT_LINES: i32 = 24;
/// Default terminal column count.
pub const DEFAULT_COLUMNS: i32 = 80;

/// The session-open record: everything needed to materialise a session directory and its
/// `log` info file.
#[derive(Debug, Clone)]
pub struct SessionOpenInfo {
    /// Wall-clock seconds of session start.
    pub start_time: i64,
    /// Required: the user who submitted the command.
    pub submituser: String,
    /// Required: the host the command was submitted from.
    pub submithost: String,
    /// Required: the command being run (authoritative over `argv[0]`).
    pub command: String,
    /// User the command runs as. Defaults to `"root"`.
    pub runuser: Option<String>,
    /// Group the command runs as. Defaults to empty.
    pub rungroup: Option<String>,
    /// Controlling tty name. Defaults to `"unknown"`.
    pub ttyname: Option<String>,
    /// Working directory. Defaults to `"unknown"`.
    pub cwd: Option<String>,
    /// Terminal row count. Must be positive and fit in `i32`, else the default is kept.
    pub lines: Option<i64>,
    /// Terminal column count. Must be positive and fit in `i32`, else the default is kept.
    pub columns: Option<i64>,
    /// Full argv; `argv[0]` is ignored when rendering the `log` info file.
    pub argv: Vec<String>,
}

impl SessionOpenInfo {
    /// `runuser`, defaulted.
    pub fn runuser(&self) -> &str {
        self.runuser.as_deref().unwrap_or(DEFAULT_RUNUSER)
    }

    /// `rungroup`, defaulted to empty.
    pub fn rungroup(&self) -> &str {
        self.rungroup.as_deref().unwrap_or("")
    }

    /// `ttyname`, defaulted.
    pub fn ttyname(&self) -> &str {
        self.ttyname.as_deref().unwrap_or(DEFAULT_TTYNAME)
    }

    /// `cwd`, defaulted.
    pub fn cwd(&self) -> &str {
        self.cwd.as_deref().unwrap_or(DEFAULT_CWD)
    }

    /// `lines`, validated against the `(0, i32::MAX]` range and defaulted otherwise.
    pub fn lines(&self) -> i32 {
        validated_dimension(self.lines, DEFAULT_LINES)
    }

    /// `columns`, validated against the `(0, i32::MAX]` range and defaulted otherwise.
    pub fn columns(&self) -> i32 {
        validated_dimension(self.columns, DEFAULT_COLUMNS)
    }

    /// Check the three fields a session-open record is required to carry. Mirrors the
    /// `iolog_details_fill` required-settings check in sudo's own `iolog_writer.c`: a
    /// missing `submituser`, `submithost`, or `command` aborts session open rather than
    /// being caught further downstream.
    pub(crate) fn validate(&self) -> IoLogResult<()> {
        if self.submituser.is_empty() {
            return Err(missing("submituser"));
        }
        if self.submithost.is_empty() {
            return Err(missing("submithost"));
        }
        if self.command.is_empty() {
            return Err(missing("command"));
        }
        Ok(())
    }

    /// The command line written to the `log` info file: `command` followed by
    /// `argv[1..]`, space-separated. An empty or single-element `argv` yields the bare
    /// command with no trailing space.
    pub fn command_line(&self) -> String {
        if self.argv.len() <= 1 {
            return self.command.clone();
        }
        let mut line = self.command.clone();
        for arg in &self.argv[1..] {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn validated_dimension(value: Option<i64>, default: i32) -> i32 {
    match value {
        Some(v) if v > 0 && v <= i32::MAX as i64 => v as i32,
        _ => default,
    }
}

fn missing(field: &str) -> IoLogError {
    IoLogError::FormatInvalid {
        reason: format!("session-open record is missing required field {field:?}"),
    }
}

/// One chunk of bytes observed on a data stream.
#[derive(Debug, Clone)]
pub struct DataEvent {
    /// Which data stream (`{Stdin..TtyOut}`) the bytes belong to.
    pub stream: crate::timing::StreamId,
    /// Delay since the previous event.
    pub delay: ElapsedTime,
    /// The bytes themselves.
    pub bytes: Vec<u8>,
}

/// The command was suspended or resumed by a signal.
#[derive(Debug, Clone)]
pub struct SuspendEvent {
    /// Delay since the previous event.
    pub delay: ElapsedTime,
    /// Signal name, e.g. `"SIGTSTP"`.
    pub signal: String,
}

/// The client's terminal window was resized.
#[derive(Debug, Clone)]
pub struct WinSizeEvent {
    /// Delay since the previous event.
    pub delay: ElapsedTime,
    /// New row count.
    pub rows: u32,
    /// New column count.
    pub cols: u32,
}

/// A request to resume logging against an existing, previously interrupted session.
#[derive(Debug, Clone)]
pub struct RestartEvent {
    /// Path to the existing session directory.
    pub log_id: String,
    /// Elapsed-time instant the client wants to resume from.
    pub resume_point: ElapsedTime,
}

/// The closed set of events the transport layer hands to this crate.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Open a brand new session.
    SessionOpen(SessionOpenInfo),
    /// Append a chunk of stream data.
    Data(DataEvent),
    /// Record a suspend/resume signal.
    Suspend(SuspendEvent),
    /// Record a terminal resize.
    WinSize(WinSizeEvent),
    /// Resume an interrupted session.
    Restart(RestartEvent),
}
