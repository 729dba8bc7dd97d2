//! The log directory builder: creates (or reopens) the on-disk session directory and owns
//! its directory handle plus the six stream handles.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::IoLogConfig;
use crate::error::{IoLogError, IoLogResult};
use crate::handles::{self, OwnedRawFd};
use crate::timing::StreamId;

/// The six named handles a session owns, indexed by [`StreamId`].
pub(crate) struct StreamHandles {
    slots: [Option<OwnedRawFd>; 6],
}

impl StreamHandles {
    fn empty() -> Self {
        StreamHandles {
            slots: Default::default(),
        }
    }

    pub(crate) fn get(&self, stream: StreamId) -> Option<&OwnedRawFd> {
        self.slots[stream as usize].as_ref()
    }

    pub(crate) fn set(&mut self, stream: StreamId, fd: OwnedRawFd) {
        self.slots[stream as usize] = Some(fd);
    }

    pub(crate) fn is_open(&self, stream: StreamId) -> bool {
        self.slots[stream as usize].is_some()
    }
}

impl std::fmt::Debug for StreamHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open: Vec<&str> = StreamId::DATA_STREAMS
            .into_iter()
            .chain([StreamId::Timing])
            .filter(|s| self.is_open(*s))
            .map(StreamId::file_name)
            .collect();
        write!(f, "StreamHandles {{ open: {open:?} }}")
    }
}

/// Owns a session's directory handle and its (possibly sparse) set of stream handles.
#[derive(Debug)]
pub(crate) struct SessionDirectory {
    pub(crate) path: PathBuf,
    // Declared before `dir_fd` so Rust's in-declaration-order field drop closes every
    // stream handle before the directory handle they were opened through, matching the
    // resource release order the connection manager expects.
    pub(crate) streams: StreamHandles,
    pub(crate) dir_fd: OwnedRawFd,
}

impl SessionDirectory {
    /// Create `<root>/<submithost>/<submituser>/XXXXXX` and open it as a directory handle.
    /// No stream files are created yet -- those are lazily created on first write (or,
    /// during restart, opened up front by [`SessionDirectory::reopen`]).
    pub(crate) fn create(
        config: &IoLogConfig,
        submithost: &str,
        submituser: &str,
    ) -> IoLogResult<SessionDirectory> {
        mkdir_component(&config.root, 0o755)?;
        let host_dir = config.root.join(submithost);
        mkdir_component(&host_dir, 0o755)?;
        let user_dir = host_dir.join(submituser);
        mkdir_component(&user_dir, 0o755)?;

        let suffix = "X".repeat(config.suffix_len.max(1));
        let template = user_dir.join(&suffix);
        let leaf = handles::mkdtemp_dir(&template)
            .map_err(|e| IoLogError::storage_unavailable(&template, e))?;

        match handles::open_dir(&leaf) {
            Ok(dir_fd) => {
                debug!("created session directory {}", leaf.display());
                Ok(SessionDirectory {
                    path: leaf,
                    dir_fd,
                    streams: StreamHandles::empty(),
                })
            }
            Err(e) => {
                warn!(
                    "failed to open newly created session directory {}: {}",
                    leaf.display(),
                    e
                );
                handles::rmdir_best_effort(&leaf);
                Err(IoLogError::storage_unavailable(&leaf, e))
            }
        }
    }

    /// Reopen an existing session directory by path, for restart. Each of the six stream
    /// files is opened read/write; a file that cannot be opened for any reason is recorded
    /// as absent rather than failing the reopen outright (absence is only fatal if replay
    /// later references that stream).
    pub(crate) fn reopen(log_id: &str) -> IoLogResult<SessionDirectory> {
        let path = PathBuf::from(log_id);
        let dir_fd =
            handles::open_dir(&path).map_err(|e| IoLogError::storage_unavailable(&path, e))?;

        let mut streams = StreamHandles::empty();
        for stream in StreamId::DATA_STREAMS.into_iter().chain([StreamId::Timing]) {
            if let Some(fd) = handles::openat_rw_optional(dir_fd.as_raw_fd(), stream.file_name()) {
                streams.set(stream, fd);
            } else {
                debug!(
                    "{}: stream {} absent on reopen",
                    path.display(),
                    stream.file_name()
                );
            }
        }

        Ok(SessionDirectory {
            path,
            dir_fd,
            streams,
        })
    }

    /// Lazily create (if needed) and return the handle for a data stream.
    pub(crate) fn ensure_stream(&mut self, stream: StreamId) -> IoLogResult<RawFdView<'_>> {
        if !self.streams.is_open(stream) {
            let fd = handles::openat_create_excl(self.dir_fd.as_raw_fd(), stream.file_name())
                .map_err(|e| IoLogError::write_failed(stream, e))?;
            self.streams.set(stream, fd);
        }
        Ok(RawFdView(self.streams.get(stream).expect("just inserted")))
    }

    /// The handle for `Timing`, if it has been created/opened yet.
    pub(crate) fn timing_handle(&self) -> Option<RawFdView<'_>> {
        self.streams.get(StreamId::Timing).map(RawFdView)
    }

    /// Same as [`SessionDirectory::ensure_stream`] but specialised for the timing file,
    /// which the append engine always needs (it writes a record for every event).
    pub(crate) fn ensure_timing(&mut self) -> IoLogResult<RawFdView<'_>> {
        self.ensure_stream(StreamId::Timing)
    }
}

/// A thin, copyable view over a raw fd owned by a [`SessionDirectory`]; avoids borrowing
/// the whole directory struct just to pass a descriptor into the handles module's
/// free functions.
#[derive(Clone, Copy)]
pub(crate) struct RawFdView<'a>(&'a OwnedRawFd);

impl RawFdView<'_> {
    pub(crate) fn raw(self) -> std::os::unix::io::RawFd {
        self.0.as_raw_fd()
    }
}

fn mkdir_component(path: &Path, mode: u32) -> IoLogResult<()> {
    handles::mkdir_reuse_existing(path, mode).map_err(|e| IoLogError::storage_unavailable(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_builds_nested_layout() {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let dir = SessionDirectory::create(&config, "h1", "alice").unwrap();
        assert!(dir.path.starts_with(root.path().join("h1").join("alice")));
        assert!(dir.path.is_dir());
    }

    #[test]
    fn create_reuses_existing_intermediate_dirs() {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let first = SessionDirectory::create(&config, "h1", "alice").unwrap();
        let second = SessionDirectory::create(&config, "h1", "alice").unwrap();
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn reopen_tolerates_missing_streams() {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let created = SessionDirectory::create(&config, "h1", "alice").unwrap();
        let path = created.path.to_str().unwrap().to_string();
        drop(created);

        let reopened = SessionDirectory::reopen(&path).unwrap();
        assert!(!reopened.streams.is_open(StreamId::Stdout));
        assert!(!reopened.streams.is_open(StreamId::Timing));
    }
}
