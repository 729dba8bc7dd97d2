//! The append engine: turns decoded client events into stream writes plus timing records,
//! keeping `elapsed_time` in lockstep with what has actually been committed to disk.

use log::trace;

use crate::dir::SessionDirectory;
use crate::error::{IoLogError, IoLogResult};
use crate::handles;
use crate::timing::{self, ElapsedTime, StreamId};

/// Append `bytes` to `stream`, then the matching timing record, then advance
/// `elapsed_time`. The ordering is load-bearing: if the process dies between the two
/// writes, restart's replay sees a data chunk with no timing record for it and simply
/// never advances past (or truncates) that trailing, uncounted data.
pub(crate) fn append_data(
    dir: &mut SessionDirectory,
    elapsed: &mut ElapsedTime,
    stream: StreamId,
    delay: ElapsedTime,
    bytes: &[u8],
) -> IoLogResult<()> {
    if !stream.is_data_stream() {
        return Err(IoLogError::InvalidStream(stream));
    }

    let data_fd = dir.ensure_stream(stream)?.raw();
    write_exact(data_fd, stream, bytes)?;

    let line = timing::encode_bytes(stream, delay, bytes.len() as u64)?;
    let timing_fd = dir.ensure_timing()?.raw();
    write_exact(timing_fd, StreamId::Timing, line.as_bytes())?;

    *elapsed = elapsed.add(delay);
    trace!(
        "{}: {} bytes to {}, elapsed now {}",
        dir.path.display(),
        bytes.len(),
        stream.file_name(),
        elapsed
    );
    Ok(())
}

/// Record a suspend/resume signal. No stream data; only a timing record.
pub(crate) fn append_suspend(
    dir: &mut SessionDirectory,
    elapsed: &mut ElapsedTime,
    delay: ElapsedTime,
    signal: &str,
) -> IoLogResult<()> {
    let line = timing::encode_suspend(delay, signal)?;
    let timing_fd = dir.ensure_timing()?.raw();
    write_exact(timing_fd, StreamId::Timing, line.as_bytes())?;
    *elapsed = elapsed.add(delay);
    trace!("{}: suspend {signal}, elapsed now {elapsed}", dir.path.display());
    Ok(())
}

/// Record a terminal resize. No stream data; only a timing record.
pub(crate) fn append_winsize(
    dir: &mut SessionDirectory,
    elapsed: &mut ElapsedTime,
    delay: ElapsedTime,
    rows: u32,
    cols: u32,
) -> IoLogResult<()> {
    let line = timing::encode_winsize(delay, rows, cols)?;
    let timing_fd = dir.ensure_timing()?.raw();
    write_exact(timing_fd, StreamId::Timing, line.as_bytes())?;
    *elapsed = elapsed.add(delay);
    trace!(
        "{}: winsize {rows}x{cols}, elapsed now {elapsed}",
        dir.path.display()
    );
    Ok(())
}

fn write_exact(fd: std::os::unix::io::RawFd, stream: StreamId, buf: &[u8]) -> IoLogResult<()> {
    let written = handles::write_once(fd, buf).map_err(|e| IoLogError::write_failed(stream, e))?;
    if written != buf.len() {
        return Err(IoLogError::write_failed(
            stream,
            std::io::Error::new(std::io::ErrorKind::WriteZero, "short write"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoLogConfig;

    fn fresh_dir() -> (tempfile::TempDir, SessionDirectory) {
        let root = tempfile::tempdir().unwrap();
        let config = IoLogConfig::with_root(root.path());
        let dir = SessionDirectory::create(&config, "h1", "alice").unwrap();
        (root, dir)
    }

    #[test]
    fn single_data_event_matches_scenario_1() {
        let (_root, mut dir) = fresh_dir();
        let mut elapsed = ElapsedTime::default();
        append_data(
            &mut dir,
            &mut elapsed,
            StreamId::Stdout,
            ElapsedTime::new(0, 500_000_000),
            b"total 0\n",
        )
        .unwrap();

        assert_eq!(elapsed, ElapsedTime::new(0, 500_000_000));
        let stdout = std::fs::read(dir.path.join("stdout")).unwrap();
        assert_eq!(stdout, b"total 0\n");
        let timing = std::fs::read_to_string(dir.path.join("timing")).unwrap();
        assert_eq!(timing, "1 0.500000000 8\n");
    }

    #[test]
    fn winsize_then_data_matches_scenario_2() {
        let (_root, mut dir) = fresh_dir();
        let mut elapsed = ElapsedTime::default();
        append_winsize(&mut dir, &mut elapsed, ElapsedTime::new(1, 0), 40, 120).unwrap();
        append_data(
            &mut dir,
            &mut elapsed,
            StreamId::Stdout,
            ElapsedTime::default(),
            b"x",
        )
        .unwrap();

        assert_eq!(elapsed, ElapsedTime::new(1, 0));
        let timing = std::fs::read_to_string(dir.path.join("timing")).unwrap();
        assert_eq!(timing, "5 1.000000000 40 120\n1 0.000000000 1\n");
    }

    #[test]
    fn suspend_matches_scenario_3() {
        let (_root, mut dir) = fresh_dir();
        let mut elapsed = ElapsedTime::default();
        append_suspend(&mut dir, &mut elapsed, ElapsedTime::new(0, 250_000_000), "SIGTSTP").unwrap();
        let timing = std::fs::read_to_string(dir.path.join("timing")).unwrap();
        assert_eq!(timing, "5 0.250000000 SIGTSTP\n");
    }

    #[test]
    fn invalid_stream_is_rejected() {
        let (_root, mut dir) = fresh_dir();
        let mut elapsed = ElapsedTime::default();
        let err = append_data(
            &mut dir,
            &mut elapsed,
            StreamId::Timing,
            ElapsedTime::default(),
            b"x",
        )
        .unwrap_err();
        assert!(matches!(err, IoLogError::InvalidStream(StreamId::Timing)));
    }
}
