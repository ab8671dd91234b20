//! Sources of newline-terminated telemetry text.
//!
//! A [`LineSource`] hands out one decoded line at a time. Reads are bounded
//! by a timeout so that a silent glove can't hang the caller; a timeout is
//! reported as [`ReadOutcome::Idle`] and the caller simply asks again. Bytes
//! that aren't valid UTF-8 are replaced rather than rejected, and a lost
//! connection shows up as [`ReadOutcome::EndOfStream`], never as a panic.

use chrono::{DateTime, Local};
use log::{debug, error, info};
use serial2::SerialPort;

use std::{
    borrow::Cow,
    collections::VecDeque,
    io::{self, ErrorKind, Read},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Baud rate the glove firmware talks at.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// How long a single read may block.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 256;

/// Longest line kept while waiting for its terminator. Anything longer is
/// noise, not telemetry.
const MAX_LINE_LEN: usize = 4096;

/// A single decoded line of text and when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// The line, without its terminator
    pub text: String,
    #[allow(missing_docs)]
    pub received_at: DateTime<Local>,
}

/// What a single [`LineSource::next_line`] call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// A complete line
    Line(RawLine),
    /// Nothing complete arrived before the read timeout; try again
    Idle,
    /// The transport is gone
    EndOfStream,
}

/// Something that yields telemetry one line at a time.
pub trait LineSource {
    /// Reads until a line is complete, the read timeout elapses, or the
    /// transport goes away.
    fn next_line(&mut self) -> ReadOutcome;

    /// Tries once to re-establish a lost transport.
    fn reconnect(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "this line source can't reconnect",
        ))
    }
}

/// Splits a byte stream into lossily decoded lines.
#[derive(Debug, Default)]
struct LineAssembler {
    pending: Vec<u8>,
    ready: VecDeque<RawLine>,
}

impl LineAssembler {
    fn push(&mut self, bytes: &[u8]) {
        for &c in bytes {
            if c == b'\n' {
                let line = self.decode_pending();
                self.ready.push_back(line);
            } else if self.pending.len() >= MAX_LINE_LEN {
                debug!("Dropping {} bytes without a line break", self.pending.len());
                self.pending.clear();
                self.pending.push(c);
            } else {
                self.pending.push(c);
            }
        }
    }

    fn decode_pending(&mut self) -> RawLine {
        let text = match String::from_utf8_lossy(&self.pending) {
            Cow::Borrowed(s) => s.trim_end_matches('\r').to_owned(),
            // Often happens at the beginning of transmission when there is
            // still garbage in the hardware buffer
            Cow::Owned(s) => {
                debug!("Replaced invalid utf-8 in {:?}", s);
                s.trim_end_matches('\r').to_owned()
            }
        };
        self.pending.clear();

        RawLine {
            text,
            received_at: Local::now(),
        }
    }

    /// The unterminated tail of the stream, if any.
    fn take_partial(&mut self) -> Option<RawLine> {
        (!self.pending.is_empty()).then(|| self.decode_pending())
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
    }

    /// Hands out a buffered line, or performs one read through `read` to
    /// try and complete one.
    fn next_from(&mut self, read: impl FnOnce(&mut [u8]) -> io::Result<usize>) -> ReadOutcome {
        if let Some(line) = self.ready.pop_front() {
            return ReadOutcome::Line(line);
        }

        let mut buffer = [0; READ_CHUNK];
        match read(&mut buffer) {
            Ok(0) => self
                .take_partial()
                .map_or(ReadOutcome::EndOfStream, ReadOutcome::Line),
            Ok(read_len) => {
                self.push(&buffer[..read_len]);
                self.ready
                    .pop_front()
                    .map_or(ReadOutcome::Idle, ReadOutcome::Line)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                ReadOutcome::Idle
            }
            Err(e) => {
                error!("Device disconnected: {}", e);
                ReadOutcome::EndOfStream
            }
        }
    }
}

/// Reads telemetry from the glove's serial port.
pub struct SerialLineSource {
    port: Arc<SerialPort>,
    path: PathBuf,
    baud_rate: u32,
    read_timeout: Duration,
    lines: LineAssembler,
}

fn open_port(path: &Path, baud_rate: u32, read_timeout: Duration) -> io::Result<SerialPort> {
    let mut port = SerialPort::open(path, baud_rate)?;
    port.set_read_timeout(read_timeout)?;
    Ok(port)
}

impl SerialLineSource {
    /// Opens the serial device at `path`.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, read_timeout: Duration) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let port = open_port(&path, baud_rate, read_timeout)?;
        info!("Connected to {} at {} baud", path.display(), baud_rate);

        Ok(Self {
            port: Arc::new(port),
            path,
            baud_rate,
            read_timeout,
            lines: LineAssembler::default(),
        })
    }

    /// A handle on the open port, for writing commands back to the glove.
    /// A [`LineSource::reconnect`] replaces the port, so fetch a fresh handle
    /// after one.
    pub fn port(&self) -> Arc<SerialPort> {
        self.port.clone()
    }

    #[allow(missing_docs)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for SerialLineSource {
    fn next_line(&mut self) -> ReadOutcome {
        let port = &self.port;
        self.lines.next_from(|buf| port.read(buf))
    }

    fn reconnect(&mut self) -> io::Result<()> {
        info!("Reconnecting to {}", self.path.display());
        let port = open_port(&self.path, self.baud_rate, self.read_timeout)?;
        self.port = Arc::new(port);
        self.lines.clear();
        Ok(())
    }
}

/// Reads telemetry from any [`Read`]er, such as a capture of a previous
/// session's serial output.
pub struct ReaderLineSource<R: Read> {
    reader: R,
    lines: LineAssembler,
}

impl<R: Read> ReaderLineSource<R> {
    #[allow(missing_docs)]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lines: LineAssembler::default(),
        }
    }
}

impl<R: Read> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> ReadOutcome {
        let reader = &mut self.reader;
        self.lines.next_from(|buf| reader.read(buf))
    }
}

/// Lists the serial devices present on this machine.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drains a source until it reports the end of the stream.
    fn drain(source: &mut impl LineSource) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match source.next_line() {
                ReadOutcome::Line(line) => lines.push(line.text),
                ReadOutcome::Idle => continue,
                ReadOutcome::EndOfStream => return lines,
            }
        }
    }

    /// Hands out its chunks one read at a time, with an optional error in
    /// between.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_splits_lines() {
        let mut source = ReaderLineSource::new("STOP\r\nFlex1: ADC = 1 | Angle: 2°\nlast".as_bytes());
        assert_eq!(
            drain(&mut source),
            vec!["STOP", "Flex1: ADC = 1 | Angle: 2°", "last"]
        );
        assert_eq!(source.next_line(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes: &[u8] = b"\xff\xfeSTOP\nok\n";
        let mut source = ReaderLineSource::new(bytes);
        assert_eq!(drain(&mut source), vec!["\u{FFFD}\u{FFFD}STOP", "ok"]);
    }

    #[test]
    fn test_timeout_is_idle() {
        let mut source = ReaderLineSource::new(ScriptedReader {
            script: VecDeque::from(vec![
                Ok(b"Phase: Gr".to_vec()),
                Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                Ok(b"ip | Countdown: 3\n".to_vec()),
            ]),
        });
        assert_eq!(source.next_line(), ReadOutcome::Idle);
        assert_eq!(source.next_line(), ReadOutcome::Idle);
        match source.next_line() {
            ReadOutcome::Line(line) => assert_eq!(line.text, "Phase: Grip | Countdown: 3"),
            other => panic!("expected a line, got {:?}", other),
        }
        assert_eq!(source.next_line(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_disconnect_is_end_of_stream() {
        let mut source = ReaderLineSource::new(ScriptedReader {
            script: VecDeque::from(vec![
                Ok(b"one\n".to_vec()),
                Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
            ]),
        });
        assert!(matches!(source.next_line(), ReadOutcome::Line(_)));
        assert_eq!(source.next_line(), ReadOutcome::EndOfStream);
        assert!(source.reconnect().is_err());
    }

    #[test]
    fn test_runaway_line_is_dropped() {
        let mut noise = vec![b'x'; MAX_LINE_LEN * 3];
        noise.extend_from_slice(b"\nSTOP\n");
        let mut source = ReaderLineSource::new(&noise[..]);

        let lines = drain(&mut source);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].len() <= MAX_LINE_LEN);
        assert_eq!(lines[1], "STOP");
    }

    #[test]
    fn test_many_lines_in_one_read() {
        let mut source = ReaderLineSource::new(ScriptedReader {
            script: VecDeque::from(vec![Ok(b"a\nb\nc\n".to_vec())]),
        });
        assert_eq!(drain(&mut source), vec!["a", "b", "c"]);
    }
}
