//! Durable session I/O log writer.
//!
//! This crate is the storage core of a remote session-logging service for a privileged
//! command launcher: given a decoded session-open record it materialises a session
//! directory on disk, then appends the interleaved stdio/tty byte streams and their timing
//! to a fixed set of per-session files as the command runs. If a client disconnects and
//! reconnects, [`IoLogSession::restart`] replays the existing timing file to the exact
//! byte offset the client asserts it last received, truncating away anything written past
//! that point, before handing back a session ready for further appends.
//!
//! Everything this crate does is local and synchronous: decoding the wire protocol,
//! network transport, authentication, and process supervision are all the caller's
//! responsibility. A caller talks to this crate purely through [`IoLogSession`] and the
//! plain-data [`ClientEvent`] variants that describe what a client asked for.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use log::debug;

mod append;
mod config;
mod dir;
mod error;
mod event;
mod handles;
mod metadata;
mod restart;
mod timing;

pub use config::IoLogConfig;
pub use error::{IoLogError, IoLogResult};
pub use event::{
    ClientEvent, DataEvent, RestartEvent, SessionOpenInfo, SuspendEvent, WinSizeEvent,
    DEFAULT_COLUMNS, DEFAULT_CWD, DEFAULT_LINES, DEFAULT_RUNUSER, DEFAULT_TTYNAME,
};
pub use timing::{
    decode, encode_bytes, encode_suspend, encode_winsize, ElapsedTime, StreamId, TimingPayload,
    TimingRecord,
};

use dir::SessionDirectory;

/// A live or just-resumed session: the on-disk directory handle plus the stream handles it
/// owns and the cumulative elapsed time logged so far.
///
/// Dropping a session closes every handle it holds (see [`dir::SessionDirectory`]'s field
/// order, which closes stream handles before the directory handle).
pub struct IoLogSession {
    dir: SessionDirectory,
    elapsed_time: ElapsedTime,
}

impl std::fmt::Debug for IoLogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoLogSession")
            .field("path", &self.dir.path)
            .field("elapsed_time", &self.elapsed_time)
            .finish()
    }
}

impl IoLogSession {
    /// Materialise a brand-new session directory from a session-open record: build
    /// `<root>/<host>/<user>/XXXXXX`, write the `log` info file, and return a session ready
    /// to accept `append_*` calls with `elapsed_time` at zero.
    pub fn open(config: &IoLogConfig, info: &SessionOpenInfo) -> IoLogResult<IoLogSession> {
        info.validate()?;
        let dir = SessionDirectory::create(config, &info.submithost, &info.submituser)?;
        metadata::write_info_file(&dir, info)?;
        debug!("opened session {}", dir.path.display());
        Ok(IoLogSession {
            dir,
            elapsed_time: ElapsedTime::default(),
        })
    }

    /// Resume logging against an existing session directory, replaying its timing file up
    /// to `target` and truncating every stream (and the timing file) it touches to that
    /// exact instant. Fails with [`IoLogError::RestartMismatch`] if no record lands exactly
    /// on `target`, or [`IoLogError::RestartUnusable`] if the log can't be replayed at all.
    pub fn restart(log_id: &str, target: ElapsedTime) -> IoLogResult<IoLogSession> {
        let (dir, elapsed_time) = restart::restart(log_id, target)?;
        Ok(IoLogSession { dir, elapsed_time })
    }

    /// Canonical path of this session's on-disk directory. Callers should hang on to this
    /// (as the `log_id`) if they want to support restarting the session later.
    pub fn path(&self) -> &std::path::Path {
        &self.dir.path
    }

    /// Cumulative elapsed time logged so far, i.e. the sum of every `delay` passed to
    /// `append_*` (or, immediately after [`IoLogSession::restart`], the resume target).
    pub fn elapsed_time(&self) -> ElapsedTime {
        self.elapsed_time
    }

    /// Append a chunk of bytes to one of the five data streams, then its timing record,
    /// then advance `elapsed_time`. `stream` must not be [`StreamId::Timing`].
    pub fn append_data(
        &mut self,
        stream: StreamId,
        delay: ElapsedTime,
        bytes: &[u8],
    ) -> IoLogResult<()> {
        append::append_data(&mut self.dir, &mut self.elapsed_time, stream, delay, bytes)
    }

    /// Record a suspend/resume signal.
    pub fn append_suspend(&mut self, delay: ElapsedTime, signal: &str) -> IoLogResult<()> {
        append::append_suspend(&mut self.dir, &mut self.elapsed_time, delay, signal)
    }

    /// Record a terminal window resize.
    pub fn append_winsize(&mut self, delay: ElapsedTime, rows: u32, cols: u32) -> IoLogResult<()> {
        append::append_winsize(&mut self.dir, &mut self.elapsed_time, delay, rows, cols)
    }

    /// Dispatch one decoded client event to the matching entry point. Only the three
    /// append-shaped events (`Data`, `Suspend`, `WinSize`) apply to an already-open
    /// session; `SessionOpen` and `Restart` construct a *new* [`IoLogSession`] via
    /// [`IoLogSession::open`]/[`IoLogSession::restart`] instead and are rejected here.
    pub fn dispatch(&mut self, event: ClientEvent) -> IoLogResult<()> {
        match event {
            ClientEvent::Data(d) => self.append_data(d.stream, d.delay, &d.bytes),
            ClientEvent::Suspend(s) => self.append_suspend(s.delay, &s.signal),
            ClientEvent::WinSize(w) => self.append_winsize(w.delay, w.rows, w.cols),
            ClientEvent::SessionOpen(_) | ClientEvent::Restart(_) => Err(IoLogError::FormatInvalid {
                reason: "session-open/restart events do not apply to an already-open session"
                    .to_string(),
            }),
        }
    }
}

impl Drop for IoLogSession {
    fn drop(&mut self) {
        debug!("closing session {}", self.dir.path.display());
    }
}
