//! The restart engine: replays an existing session's timing file up to a client-asserted
//! resume instant, seeking and truncating every stream it touches (and finally the timing
//! file itself) to exactly that instant.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::os::unix::io::FromRawFd;

use log::{debug, warn};

use crate::dir::SessionDirectory;
use crate::error::{IoLogError, IoLogResult};
use crate::handles;
use crate::timing::{self, ElapsedTime, StreamId, TimingPayload};

/// Reopen `log_id` and replay its timing file up to `target`, seeking/truncating every
/// stream it references and finally the timing file itself. On success the returned
/// directory is ready to accept further `append_*` calls with `elapsed_time == target`.
pub(crate) fn restart(log_id: &str, target: ElapsedTime) -> IoLogResult<(SessionDirectory, ElapsedTime)> {
    let mut dir = SessionDirectory::reopen(log_id)?;

    let timing_fd = dir
        .timing_handle()
        .ok_or_else(|| unusable("timing file is absent, nothing to replay"))?
        .raw();

    let dup_fd = handles::dup(timing_fd)
        .map_err(|e| IoLogError::write_failed(crate::timing::StreamId::Timing, e))?;
    // SAFETY: `dup_fd` was just returned by `dup(2)` and is not owned anywhere else; the
    // `File` below takes sole ownership and closes it on drop, leaving the original
    // `timing_fd` untouched for the writable seek/truncate pass that follows.
    let mut reader = BufReader::new(unsafe { File::from_raw_fd(dup_fd) });

    // Every preserved byte on a data stream is accounted for by a timing record the loop
    // below replays; a stream with zero preserved records (including every data stream
    // when `target` is `(0, 0)`) must end up at length zero. Reset every currently-open
    // data stream to empty up front so the loop only ever has to grow a stream back out
    // to the records it actually keeps, rather than special-casing "nothing to replay".
    for stream in StreamId::DATA_STREAMS {
        if let Some(fd) = dir.streams.get(stream) {
            let fd = fd.as_raw_fd();
            handles::lseek_set(fd, 0).map_err(|e| IoLogError::write_failed(stream, e))?;
            handles::ftruncate(fd, 0).map_err(|e| IoLogError::write_failed(stream, e))?;
        }
    }

    let mut elapsed = ElapsedTime::default();
    while elapsed != target {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| unusable(format!("error reading timing file: {e}")))?;
        if n == 0 || !line.ends_with('\n') {
            return Err(unusable(
                "timing file ended before the requested resume point was reached",
            ));
        }

        let record = timing::decode(&line)
            .map_err(|e| unusable(format!("invalid timing record during replay: {e}")))?;
        elapsed = elapsed.add(record.delay);

        if let TimingPayload::Bytes { stream, nbytes } = record.payload {
            let fd = dir
                .streams
                .get(stream)
                .ok_or_else(|| {
                    unusable(format!(
                        "stream {} referenced by timing file but not open",
                        stream.file_name()
                    ))
                })?
                .as_raw_fd();
            let new_len = handles::lseek_cur(fd, nbytes as i64)
                .map_err(|e| IoLogError::write_failed(stream, e))?;
            handles::ftruncate(fd, new_len).map_err(|e| IoLogError::write_failed(stream, e))?;
        }

        match elapsed.cmp(&target) {
            Ordering::Less => continue,
            Ordering::Equal => break,
            Ordering::Greater => {
                warn!(
                    "{}: resume point mismatch, target {target}, replay reached {elapsed}",
                    dir.path.display()
                );
                return Err(IoLogError::RestartMismatch {
                    target,
                    reached: elapsed,
                });
            }
        }
    }

    let cutoff = reader
        .stream_position()
        .map_err(|e| IoLogError::write_failed(crate::timing::StreamId::Timing, e))?;
    drop(reader); // closes the duplicated descriptor

    handles::lseek_set(timing_fd, cutoff as i64)
        .map_err(|e| IoLogError::write_failed(crate::timing::StreamId::Timing, e))?;
    handles::ftruncate(timing_fd, cutoff as i64)
        .map_err(|e| IoLogError::write_failed(crate::timing::StreamId::Timing, e))?;

    debug!("{}: restarted to {elapsed}", dir.path.display());
    Ok((dir, elapsed))
}

fn unusable(reason: impl Into<String>) -> IoLogError {
    IoLogError::RestartUnusable {
        reason: reason.into(),
    }
}
