//! The reading loop of one recording session.
//!
//! A [`Session`] owns everything the reading worker touches: the line
//! source, the accumulator and its state, and the recorder. The only thing
//! it shares is the [`SessionControl`], which it checks once per line.

use crate::control::SessionControl;
use crate::line_source::{LineSource, ReadOutcome};
use crate::recorder::{RecorderError, SessionRecorder};
use crate::session_accumulator::SessionAccumulator;
use crate::telemetry_decoder::{self, Fragment, StatusReading};

use log::{debug, error, info, warn};

use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Write},
    sync::{
        mpsc::{SyncSender, TrySendError},
        Arc,
    },
};

/// Why the reading loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`SessionControl::stop`] was called
    Requested,
    /// The glove printed the stop sentinel
    Sentinel,
    /// The transport went away and could not be reconnected
    EndOfStream,
}

/// Counters describing a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Lines read from the source
    pub lines_read: usize,
    /// Lines that didn't decode into a fragment
    pub lines_unrecognized: usize,
    /// Rows written to the sink
    pub rows_written: usize,
    /// Rows completed while paused, and so not written
    pub rows_suppressed: usize,
    #[allow(missing_docs)]
    pub stop_reason: StopReason,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows written ({} suppressed while paused) from {} lines ({} unrecognized), stopped by {:?}",
            self.rows_written,
            self.rows_suppressed,
            self.lines_read,
            self.lines_unrecognized,
            self.stop_reason
        )
    }
}

/// A session that could not finish cleanly.
#[derive(Debug)]
pub enum SessionError {
    /// Writing to the sink failed. The sink has been closed; rows flushed
    /// before the failure are intact.
    Sink {
        #[allow(missing_docs)]
        error: RecorderError,
        /// Rows written before the failure
        rows_written: usize,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Sink {
                error,
                rows_written,
            } => write!(
                f,
                "recording failed after {} rows: {}",
                rows_written, error
            ),
        }
    }
}

impl std::error::Error for SessionError {}

/// One logging run: from the first line read to stop.
pub struct Session<S: LineSource, W: Write = File> {
    source: S,
    accumulator: SessionAccumulator,
    recorder: SessionRecorder<W>,
    control: Arc<SessionControl>,
    status_tx: Option<SyncSender<StatusReading>>,
}

impl<S: LineSource, W: Write> Session<S, W> {
    /// Wires a line source to a recorder. Rows complete on orientation
    /// readings from `trigger_sensor`.
    pub fn new(
        source: S,
        recorder: SessionRecorder<W>,
        control: Arc<SessionControl>,
        trigger_sensor: u8,
    ) -> Self {
        Self {
            source,
            accumulator: SessionAccumulator::new(trigger_sensor),
            recorder,
            control,
            status_tx: None,
        }
    }

    /// Forwards every status reading to `status_tx`, for a display to poll.
    /// When the display falls behind, updates are dropped rather than
    /// stalling the reader.
    pub fn with_status_channel(mut self, status_tx: SyncSender<StatusReading>) -> Self {
        self.status_tx = Some(status_tx);
        self
    }

    fn forward_status(&mut self, status: &StatusReading) {
        if let Some(tx) = &self.status_tx {
            match tx.try_send(status.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Status display is behind, dropping update"),
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Status display went away");
                    self.status_tx = None;
                }
            }
        }
    }

    /// Runs the reading loop until stopped, then closes the sink. The sink
    /// is closed exactly once, whichever way the loop ends.
    pub fn run(mut self) -> Result<SessionSummary, SessionError> {
        let mut lines_read = 0;
        let mut lines_unrecognized = 0;
        let mut rows_suppressed = 0;
        let mut reconnected = false;

        let stop_reason = loop {
            if !self.control.is_running() {
                break StopReason::Requested;
            }

            let line = match self.source.next_line() {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Idle => continue,
                ReadOutcome::EndOfStream if !reconnected => {
                    reconnected = true;
                    match self.source.reconnect() {
                        Ok(()) => {
                            info!("Reconnected, carrying on");
                            continue;
                        }
                        Err(e) if e.kind() == ErrorKind::Unsupported => {
                            debug!("End of stream: {}", e);
                            break StopReason::EndOfStream;
                        }
                        Err(e) => {
                            error!("Lost the glove and could not reconnect: {}", e);
                            break StopReason::EndOfStream;
                        }
                    }
                }
                ReadOutcome::EndOfStream => break StopReason::EndOfStream,
            };
            lines_read += 1;

            let Some(fragment) = telemetry_decoder::parse(&line.text) else {
                lines_unrecognized += 1;
                continue;
            };

            match &fragment {
                Fragment::Stop => {
                    info!("Stop command received from the glove");
                    self.control.stop();
                    break StopReason::Sentinel;
                }
                Fragment::Status(status) => self.forward_status(status),
                _ => {}
            }

            let Some(row) = self.accumulator.ingest(&fragment, || self.control.labels()) else {
                continue;
            };

            if self.control.is_paused() {
                rows_suppressed += 1;
                continue;
            }

            if let Err(error) = self.recorder.write(&row) {
                error!("Failed to write row: {}", error);
                let rows_written = self.recorder.rows_written();
                if let Err(close_error) = self.recorder.finish() {
                    warn!("Failed to close the sink: {}", close_error);
                }
                return Err(SessionError::Sink {
                    error,
                    rows_written,
                });
            }
        };

        let rows_flushed = self.recorder.rows_written();
        let rows_written = self
            .recorder
            .finish()
            .map_err(|error| SessionError::Sink {
                error,
                rows_written: rows_flushed,
            })?;

        let summary = SessionSummary {
            lines_read,
            lines_unrecognized,
            rows_written,
            rows_suppressed,
            stop_reason,
        };
        info!("Session finished: {}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_source::{RawLine, ReaderLineSource};
    use crate::schema::Schema;

    use chrono::Local;
    use std::collections::{HashMap, VecDeque};
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::sync_channel;

    /// A line source that runs a callback before handing out each line, so
    /// tests can act on the control surface at an exact point in the stream.
    struct ScriptedSource {
        steps: VecDeque<(&'static str, Box<dyn FnOnce() + Send>)>,
    }

    impl ScriptedSource {
        fn new(lines: &[&'static str]) -> Self {
            Self {
                steps: lines
                    .iter()
                    .map(|&l| (l, Box::new(|| {}) as Box<dyn FnOnce() + Send>))
                    .collect(),
            }
        }

        fn then(mut self, line: &'static str, before: impl FnOnce() + Send + 'static) -> Self {
            self.steps.push_back((line, Box::new(before)));
            self
        }
    }

    impl LineSource for ScriptedSource {
        fn next_line(&mut self) -> ReadOutcome {
            match self.steps.pop_front() {
                Some((text, before)) => {
                    before();
                    ReadOutcome::Line(RawLine {
                        text: text.to_owned(),
                        received_at: Local::now(),
                    })
                }
                None => ReadOutcome::EndOfStream,
            }
        }
    }

    const CYCLE: [&str; 6] = [
        "Phase: Grip | Countdown: 5",
        "Flex1: ADC = 512 | Angle: 45°",
        "Flex2: ADC = 600 | Angle: 50°",
        "Flex3: ADC = 700 | Angle: 55°",
        "MPU6050 at 0x68 | Pitch: 1.0 | Roll: 2.0 | Yaw: 3.0",
        "MPU6050 at 0x69 | Pitch: 4.0 | Roll: 5.0 | Yaw: 6.0",
    ];

    fn in_memory(schema: Schema) -> SessionRecorder<Vec<u8>> {
        SessionRecorder::from_writer(Vec::new(), schema).unwrap()
    }

    #[test]
    fn test_stop_sentinel_closes_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let mut capture = CYCLE.join("\n");
        capture.push_str("\ngarbage data xyz\n");
        capture.push_str(&CYCLE.join("\n"));
        capture.push_str("\nSTOP\n");
        capture.push_str(&CYCLE.join("\n"));

        let control = Arc::new(SessionControl::default());
        let session = Session::new(
            ReaderLineSource::new(capture.as_bytes()),
            SessionRecorder::open(&path, Schema::Orientation).unwrap(),
            control.clone(),
            2,
        );
        let summary = session.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::Sentinel);
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.lines_read, 14);
        assert_eq!(summary.lines_unrecognized, 1);
        assert!(!control.is_running());

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            reader.headers().unwrap().get(1),
            Some("Flex1_ADC")
        );
        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][1], "512");
        assert_eq!(&records[1][12], "6.0");
    }

    #[test]
    fn test_pause_keeps_state_fresh() {
        let control = Arc::new(SessionControl::default());
        let (pause, resume) = (control.clone(), control.clone());

        let source = ScriptedSource::new(&CYCLE)
            .then("Flex1: ADC = 900 | Angle: 80°", move || pause.pause())
            .then("MPU6050 at 0x69 | Pitch: 7.0 | Roll: 8.0 | Yaw: 9.0", || {})
            .then("MPU6050 at 0x69 | Pitch: 7.5 | Roll: 8.0 | Yaw: 9.0", move || {
                let labels = HashMap::from([("gesture".to_owned(), "fist".to_owned())]);
                resume.resume(&labels);
            });

        let mut buf = Vec::new();
        let recorder = SessionRecorder::from_writer(&mut buf, Schema::Orientation).unwrap();
        let summary = Session::new(source, recorder, control, 2).run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.rows_suppressed, 1);

        let mut reader = csv::Reader::from_reader(&buf[..]);
        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        // the flex reading that arrived while paused shows up after resume
        assert_eq!(&records[1][1], "900");
        assert_eq!(&records[1][10], "7.5");
        assert_eq!(&records[1][13], "fist");
    }

    #[test]
    fn test_requested_stop() {
        let control = Arc::new(SessionControl::default());
        let stopper = control.clone();
        let source = ScriptedSource::new(&CYCLE)
            .then("Flex1: ADC = 1 | Angle: 1°", move || stopper.stop())
            .then("MPU6050 at 0x69 | Pitch: 7.0 | Roll: 8.0 | Yaw: 9.0", || {});

        let summary = Session::new(source, in_memory(Schema::Orientation), control, 2)
            .run()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(summary.rows_written, 1);
    }

    #[test]
    fn test_status_is_forwarded() {
        let (status_tx, status_rx) = sync_channel(1);
        let source = ScriptedSource::new(&[
            "Phase: Grip | Countdown: 5",
            "Phase: Grip | Countdown: 4",
            "Phase: Hold | Countdown: 5",
        ]);
        let summary = Session::new(
            source,
            in_memory(Schema::Phase),
            Arc::new(SessionControl::default()),
            2,
        )
        .with_status_channel(status_tx)
        .run()
        .unwrap();

        assert_eq!(summary.rows_written, 0);
        // the queue holds one update; the rest were dropped, not blocked on
        assert_eq!(
            status_rx.try_recv(),
            Ok(StatusReading {
                phase: "Grip".to_owned(),
                countdown: 5
            })
        );
        assert!(status_rx.try_recv().is_err());
    }

    /// Hands out its script in order, where `None` is a lost connection.
    /// Reconnecting always works and is counted.
    struct FlakySource {
        script: VecDeque<Option<&'static str>>,
        reconnects: Arc<AtomicUsize>,
    }

    impl LineSource for FlakySource {
        fn next_line(&mut self) -> ReadOutcome {
            match self.script.pop_front() {
                Some(Some(text)) => ReadOutcome::Line(RawLine {
                    text: text.to_owned(),
                    received_at: Local::now(),
                }),
                Some(None) | None => ReadOutcome::EndOfStream,
            }
        }

        fn reconnect(&mut self) -> io::Result<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_reconnects_only_once() {
        const TRIGGER: &str = "MPU6050 at 0x69 | Pitch: 4.0 | Roll: 5.0 | Yaw: 6.0";
        let reconnects = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            script: VecDeque::from(vec![
                Some(TRIGGER),
                None,
                Some(TRIGGER),
                None,
                Some(TRIGGER),
            ]),
            reconnects: reconnects.clone(),
        };

        let summary = Session::new(
            source,
            in_memory(Schema::Orientation),
            Arc::new(SessionControl::default()),
            2,
        )
        .run()
        .unwrap();

        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.lines_read, 2);
        assert_eq!(summary.rows_written, 2);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    }

    /// Accepts the header, then fails.
    struct BrokenDisk {
        writes: usize,
    }

    impl Write for BrokenDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.writes > 1 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_error_ends_session() {
        let recorder =
            SessionRecorder::from_writer(BrokenDisk { writes: 0 }, Schema::Orientation).unwrap();
        let result = Session::new(
            ScriptedSource::new(&CYCLE),
            recorder,
            Arc::new(SessionControl::default()),
            2,
        )
        .run();

        assert!(matches!(
            result,
            Err(SessionError::Sink {
                rows_written: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_trigger_sensor_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");
        let capture = CYCLE[..5].join("\n");

        let summary = Session::new(
            ReaderLineSource::new(capture.as_bytes()),
            SessionRecorder::open(&path, Schema::Orientation).unwrap(),
            Arc::new(SessionControl::default()),
            2,
        )
        .run()
        .unwrap();

        assert_eq!(summary.rows_written, 0);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
