//! Injected configuration for the I/O log writer.
//!
//! The log directory root is process-wide configuration, but the core never reaches for a
//! global or an environment variable to find it -- it is handed an [`IoLogConfig`] by
//! whatever CLI/config layer owns startup.

use std::path::PathBuf;

/// Default root sudo's own logsrvd has historically used.
const DEFAULT_ROOT: &str = "/var/log/sudo-io";

/// Width of the opaque unique suffix appended to a session directory's path, e.g.
/// `<ROOT>/<host>/<user>/XXXXXX`.
const DEFAULT_SUFFIX_LEN: usize = 6;

/// Parameters the log directory builder needs that do not vary per session.
#[derive(Debug, Clone)]
pub struct IoLogConfig {
    /// Root directory new session directories are created under.
    pub root: PathBuf,
    /// Length of the random suffix used for the session directory's leaf component.
    pub suffix_len: usize,
}

impl Default for IoLogConfig {
    fn default() -> Self {
        IoLogConfig {
            root: PathBuf::from(DEFAULT_ROOT),
            suffix_len: DEFAULT_SUFFIX_LEN,
        }
    }
}

impl IoLogConfig {
    /// Build a config rooted at an arbitrary path, keeping the default suffix width.
    pub fn with_root(root: impl Into<PathBuf>) -> IoLogConfig {
        IoLogConfig {
            root: root.into(),
            ..IoLogConfig::default()
        }
    }
}
