//! Writes the human-readable `log` info file, sudo-style: a three-line summary of who ran
//! what, from where, against which terminal.

use log::warn;

use crate::dir::SessionDirectory;
use crate::error::{IoLogError, IoLogResult};
use crate::event::SessionOpenInfo;
use crate::handles;

/// Write the `log` info file for a freshly created session directory. Fails (and the
/// session is aborted) if the file already exists or any write fails.
pub(crate) fn write_info_file(dir: &SessionDirectory, info: &SessionOpenInfo) -> IoLogResult<()> {
    let contents = format!(
        "{start}:{user}:{runuser}:{rungroup}:{tty}:{lines}:{cols}\n{cwd}\n{cmdline}\n",
        start = info.start_time,
        user = info.submituser,
        runuser = info.runuser(),
        rungroup = info.rungroup(),
        tty = info.ttyname(),
        lines = info.lines(),
        cols = info.columns(),
        cwd = info.cwd(),
        cmdline = info.command_line(),
    );

    let fd = handles::openat_create_excl(dir.dir_fd.as_raw_fd(), "log").map_err(|e| {
        warn!("{}: unable to create log info file: {}", dir.path.display(), e);
        io_write_failed(e)
    })?;

    let bytes = contents.as_bytes();
    let written = handles::write_once(fd.as_raw_fd(), bytes).map_err(|e| {
        warn!("{}: unable to write log info file: {}", dir.path.display(), e);
        io_write_failed(e)
    })?;
    if written != bytes.len() {
        return Err(io_write_failed(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "short write to log info file",
        )));
    }
    Ok(())
}

fn io_write_failed(source: std::io::Error) -> IoLogError {
    // The `log` info file has no `StreamId` of its own; reuse `Timing` as the nominal
    // stream since both are metadata about the session rather than stream payload.
    IoLogError::StorageWriteFailed {
        stream: crate::timing::StreamId::Timing,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoLogConfig;

    fn open_info() -> SessionOpenInfo {
        SessionOpenInfo {
            start_time: 1000,
            submituser: "alice".to_string(),
            submithost: "h1".to_string(),
            command: "/bin/ls".to_string(),
            runuser: None,
            rungroup: None,
            ttyname: None,
            cwd: None,
            lines: None,
            columns: None,
            argv: vec!["ls".to_string(), "-l".to_string()],
        }
    }

    #[test]
    fn writes_expected_three_lines() {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let dir = SessionDirectory::create(&config, "h1", "alice").unwrap();
        write_info_file(&dir, &open_info()).unwrap();

        let contents = std::fs::read_to_string(dir.path.join("log")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "1000:alice:root::unknown:24:80");
        assert_eq!(lines.next().unwrap(), "unknown");
        assert_eq!(lines.next().unwrap(), "/bin/ls -l");
        assert!(lines.next().is_none());
    }

    #[test]
    fn second_write_fails_because_file_already_exists() {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let dir = SessionDirectory::create(&config, "h1", "alice").unwrap();
        write_info_file(&dir, &open_info()).unwrap();
        assert!(write_info_file(&dir, &open_info()).is_err());
    }
}
