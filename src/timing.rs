//! The timing file codec.
//!
//! One line of the timing file records either a chunk of bytes that was appended to one of
//! the five byte streams, or a control event (suspend/resume signal, terminal resize). The
//! codec here is pure: it never touches a file descriptor, it only turns a record into a
//! line and back.

use std::fmt;

use crate::error::{IoLogError, IoLogResult};

/// Maximum encoded length of a single timing record, including the trailing newline.
const MAX_RECORD_LEN: usize = 1024;

/// One of the six on-disk streams a session owns.
///
/// The wire/on-disk encoding overlays the stream-id space and the timing event-kind space:
/// `Stdin..TtyOut` are data streams (kinds `0..4`), and `Timing` itself doubles as the
/// control-event kind (`5`). Keeping this as one six-variant enum instead of two parallel
/// ones keeps that duality from drifting out of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamId {
    /// Command's standard input, as typed/forwarded by the client.
    Stdin = 0,
    /// Command's standard output.
    Stdout = 1,
    /// Command's standard error.
    Stderr = 2,
    /// Raw bytes read from the controlling tty (keystrokes).
    TtyIn = 3,
    /// Raw bytes written to the controlling tty (echo/program output).
    TtyOut = 4,
    /// The master timing file; also the control-event kind.
    Timing = 5,
}

impl StreamId {
    /// All five data streams, in their fixed on-disk order.
    pub const DATA_STREAMS: [StreamId; 5] = [
        StreamId::Stdin,
        StreamId::Stdout,
        StreamId::Stderr,
        StreamId::TtyIn,
        StreamId::TtyOut,
    ];

    /// File name this stream is stored under within a session directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            StreamId::Stdin => "stdin",
            StreamId::Stdout => "stdout",
            StreamId::Stderr => "stderr",
            StreamId::TtyIn => "ttyin",
            StreamId::TtyOut => "ttyout",
            StreamId::Timing => "timing",
        }
    }

    /// Decode a wire/on-disk event-kind integer into a stream id.
    pub fn from_kind(kind: u8) -> Option<StreamId> {
        match kind {
            0 => Some(StreamId::Stdin),
            1 => Some(StreamId::Stdout),
            2 => Some(StreamId::Stderr),
            3 => Some(StreamId::TtyIn),
            4 => Some(StreamId::TtyOut),
            5 => Some(StreamId::Timing),
            _ => None,
        }
    }

    /// True for the five data streams; false for `Timing`.
    pub const fn is_data_stream(self) -> bool {
        !matches!(self, StreamId::Timing)
    }
}

/// A `(seconds, nanoseconds)` duration with nanoseconds normalised to `[0, 10^9)`.
///
/// Used both for the per-record delay and for the session's cumulative elapsed time.
/// Callers must not assume an input pair is already normalised; [`ElapsedTime::new`]
/// carries any overflowing nanoseconds into seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ElapsedTime {
    /// Whole seconds.
    pub sec: i64,
    /// Nanoseconds, always in `[0, 1_000_000_000)`.
    pub nsec: u32,
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

impl ElapsedTime {
    /// Build a normalised `ElapsedTime`, carrying any `nsec >= 1_000_000_000` into `sec`.
    pub fn new(sec: i64, nsec: u32) -> ElapsedTime {
        let extra_sec = (nsec / NANOS_PER_SEC) as i64;
        ElapsedTime {
            sec: sec + extra_sec,
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    /// Add another (possibly unnormalised) delay, carrying nanoseconds as needed.
    pub fn add(self, delta: ElapsedTime) -> ElapsedTime {
        ElapsedTime::new(self.sec + delta.sec, self.nsec + delta.nsec)
    }
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// The payload half of a decoded timing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingPayload {
    /// `nbytes` bytes were appended to `stream` immediately before this record.
    Bytes {
        /// Which of the five data streams this record refers to.
        stream: StreamId,
        /// Number of bytes appended.
        nbytes: u64,
    },
    /// The command was suspended (or resumed) by the named signal.
    Suspend(String),
    /// The terminal window was resized to `rows` x `cols`.
    WinSize {
        /// New row count.
        rows: u32,
        /// New column count.
        cols: u32,
    },
}

/// A fully decoded timing-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingRecord {
    /// Delay since the previous record.
    pub delay: ElapsedTime,
    /// What this record describes.
    pub payload: TimingPayload,
}

/// Encode a byte-stream record: `stream_id SP seconds.nanoseconds SP nbytes\n`.
pub fn encode_bytes(stream: StreamId, delay: ElapsedTime, nbytes: u64) -> IoLogResult<String> {
    if !stream.is_data_stream() {
        return Err(IoLogError::InvalidStream(stream));
    }
    format_record(stream as u8, delay, format_args!("{nbytes}"), stream)
}

/// Encode a suspend record: `5 SP seconds.nanoseconds SP signal_name\n`.
pub fn encode_suspend(delay: ElapsedTime, signal_name: &str) -> IoLogResult<String> {
    format_record(
        StreamId::Timing as u8,
        delay,
        format_args!("{signal_name}"),
        StreamId::Timing,
    )
}

/// Encode a window-resize record: `5 SP seconds.nanoseconds SP rows SP cols\n`.
pub fn encode_winsize(delay: ElapsedTime, rows: u32, cols: u32) -> IoLogResult<String> {
    format_record(
        StreamId::Timing as u8,
        delay,
        format_args!("{rows} {cols}"),
        StreamId::Timing,
    )
}

fn format_record(
    kind: u8,
    delay: ElapsedTime,
    payload: fmt::Arguments<'_>,
    stream_for_error: StreamId,
) -> IoLogResult<String> {
    let line = format!("{kind} {delay} {payload}\n");
    if line.len() > MAX_RECORD_LEN {
        return Err(IoLogError::FormatOverflow {
            stream: stream_for_error,
        });
    }
    Ok(line)
}

/// Decode one timing-file line (a trailing `\n`, if present, is stripped first).
pub fn decode(line: &str) -> IoLogResult<TimingRecord> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let mut parts = line.splitn(3, ' ');
    let kind_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("missing event kind field"))?;
    let delay_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("missing delay field"))?;
    let rest = parts.next().ok_or_else(|| invalid("missing payload field"))?;

    let kind: u8 = kind_str
        .parse()
        .map_err(|_| invalid(format!("event kind {kind_str:?} is not a small integer")))?;
    let stream =
        StreamId::from_kind(kind).ok_or_else(|| invalid(format!("unknown event kind {kind}")))?;
    let delay = parse_delay(delay_str)?;

    let payload = if stream.is_data_stream() {
        let nbytes: u64 = rest
            .parse()
            .map_err(|_| invalid(format!("byte count {rest:?} is not a non-negative integer")))?;
        TimingPayload::Bytes { stream, nbytes }
    } else {
        decode_control_payload(rest)?
    };

    Ok(TimingRecord { delay, payload })
}

fn decode_control_payload(rest: &str) -> IoLogResult<TimingPayload> {
    // A winsize payload is exactly two space-separated decimal fields; anything else
    // (including a signal name that happens to contain a space, which sudo never emits)
    // is treated as a suspend signal name.
    let mut fields = rest.splitn(2, ' ');
    let first = fields.next().unwrap_or_default();
    match fields.next() {
        Some(second) if !second.contains(' ') => {
            if let (Ok(rows), Ok(cols)) = (first.parse::<u32>(), second.parse::<u32>()) {
                return Ok(TimingPayload::WinSize { rows, cols });
            }
            Ok(TimingPayload::Suspend(rest.to_string()))
        }
        _ => Ok(TimingPayload::Suspend(rest.to_string())),
    }
}

fn parse_delay(field: &str) -> IoLogResult<ElapsedTime> {
    let (sec_str, nsec_str) = field
        .split_once('.')
        .ok_or_else(|| invalid(format!("delay {field:?} is missing a decimal point")))?;
    if nsec_str.len() != 9 {
        return Err(invalid(format!(
            "delay {field:?} does not have exactly nine nanosecond digits"
        )));
    }
    let sec: i64 = sec_str
        .parse()
        .map_err(|_| invalid(format!("delay seconds {sec_str:?} is not an integer")))?;
    let nsec: u32 = nsec_str
        .parse()
        .map_err(|_| invalid(format!("delay nanoseconds {nsec_str:?} is not an integer")))?;
    // `ElapsedTime::new` would silently carry an out-of-range nsec into sec; a well-formed
    // timing file never has one, so surface it as a decode error instead.
    if nsec >= NANOS_PER_SEC {
        return Err(invalid(format!("delay nanoseconds {nsec} out of range")));
    }
    Ok(ElapsedTime { sec, nsec })
}

fn invalid(reason: impl Into<String>) -> IoLogError {
    IoLogError::FormatInvalid {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let delay = ElapsedTime::new(0, 500_000_000);
        let line = encode_bytes(StreamId::Stdout, delay, 8).unwrap();
        assert_eq!(line, "1 0.500000000 8\n");
        let record = decode(&line).unwrap();
        assert_eq!(
            record,
            TimingRecord {
                delay,
                payload: TimingPayload::Bytes {
                    stream: StreamId::Stdout,
                    nbytes: 8
                }
            }
        );
    }

    #[test]
    fn suspend_round_trip() {
        let delay = ElapsedTime::new(0, 250_000_000);
        let line = encode_suspend(delay, "SIGTSTP").unwrap();
        assert_eq!(line, "5 0.250000000 SIGTSTP\n");
        let record = decode(&line).unwrap();
        assert_eq!(record.payload, TimingPayload::Suspend("SIGTSTP".to_string()));
    }

    #[test]
    fn winsize_round_trip() {
        let delay = ElapsedTime::new(1, 0);
        let line = encode_winsize(delay, 40, 120).unwrap();
        assert_eq!(line, "5 1.000000000 40 120\n");
        let record = decode(&line).unwrap();
        assert_eq!(
            record.payload,
            TimingPayload::WinSize { rows: 40, cols: 120 }
        );
    }

    #[test]
    fn invalid_stream_for_data_encode() {
        let err = encode_bytes(StreamId::Timing, ElapsedTime::default(), 1).unwrap_err();
        assert!(matches!(err, IoLogError::InvalidStream(StreamId::Timing)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not a timing line").is_err());
        assert!(decode("9 0.000000000 1").is_err());
        assert!(decode("1 0.5 1").is_err());
    }

    #[test]
    fn decode_strips_trailing_newline_only_once() {
        let a = decode("1 0.000000000 4\n").unwrap();
        let b = decode("1 0.000000000 4").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nanosecond_carry_on_add() {
        let delta = ElapsedTime::new(0, 999_999_999);
        let once = ElapsedTime::default().add(delta);
        let twice = once.add(delta);
        assert_eq!(twice, ElapsedTime::new(1, 999_999_998));
    }
}
