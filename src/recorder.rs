//! A CSV sink for completed [`Row`]s.

use crate::schema::Schema;
use crate::session_state::Row;

use log::info;

use std::{
    borrow::Cow,
    fmt,
    fs::{self, File},
    io::Write,
    path::Path,
};

/// Returned when the sink can't be opened, written or flushed. Any of these
/// ends the session.
#[derive(Debug)]
pub enum RecorderError {
    /// Creating, writing or flushing the output file failed.
    IoError(std::io::Error),

    /// Encoding a record failed.
    CsvError(csv::Error),
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            RecorderError::IoError(error) => Cow::from(format!("io error: {}", error)),
            RecorderError::CsvError(error) => Cow::from(format!("csv error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for RecorderError {}

impl From<std::io::Error> for RecorderError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<csv::Error> for RecorderError {
    fn from(value: csv::Error) -> Self {
        Self::CsvError(value)
    }
}

/// Appends rows to a CSV file, one flushed line per row, so that a crash
/// loses at most the row being written. The header goes out exactly once,
/// when the recorder is opened.
///
/// The recorder writes whatever it is given; whether a row should be
/// recorded (the session may be paused) is up to the caller.
pub struct SessionRecorder<W: Write = File> {
    writer: csv::Writer<W>,
    schema: Schema,
    rows_written: usize,
}

impl SessionRecorder<File> {
    /// Creates (or truncates) the file at `path`, creating its directory
    /// if needed, and writes the header for `schema`.
    pub fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        info!("Logging data to {}", path.display());

        Self::from_writer(file, schema)
    }
}

impl<W: Write> SessionRecorder<W> {
    /// Wraps any [`Write`]able sink and writes the header for `schema`.
    pub fn from_writer(sink: W, schema: Schema) -> Result<Self, RecorderError> {
        let mut writer = csv::Writer::from_writer(sink);
        writer.write_record(schema.header())?;
        writer.flush()?;

        Ok(Self {
            writer,
            schema,
            rows_written: 0,
        })
    }

    /// Appends `row` and flushes it before returning.
    pub fn write(&mut self, row: &Row) -> Result<(), RecorderError> {
        self.writer.write_record(self.schema.record(row))?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flushes and closes the sink, returning the number of rows written.
    pub fn finish(mut self) -> Result<usize, RecorderError> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    #[allow(missing_docs)]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    #[allow(missing_docs)]
    pub fn schema(&self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Labels;
    use crate::session_state::SessionState;

    use chrono::Local;
    use std::io;

    /// Accepts `budget` bytes, then fails every write.
    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn empty_row() -> Row {
        SessionState::new().snapshot(Labels::default(), Local::now())
    }

    #[test]
    fn test_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.csv");

        let mut recorder = SessionRecorder::open(&path, Schema::Phase).unwrap();

        // the header is on disk before any row is written
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "Timestamp,MPU2_Pitch,MPU2_Roll,MPU2_Yaw,Phase,Grip_Type,Object\n"
        );

        recorder.write(&empty_row()).unwrap();
        recorder.write(&empty_row()).unwrap();

        // flushed without closing
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);

        assert_eq!(recorder.finish().unwrap(), 2);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "0.0");
    }

    #[test]
    fn test_labels_with_commas_are_quoted() {
        let mut buf = Vec::new();
        {
            let mut recorder = SessionRecorder::from_writer(&mut buf, Schema::Orientation).unwrap();
            let mut row = empty_row();
            row.labels.object = "cup, handled".to_owned();
            recorder.write(&row).unwrap();
            recorder.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",\"cup, handled\""));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut recorder =
            SessionRecorder::from_writer(FailingSink { budget: 512 }, Schema::Orientation).unwrap();
        let result = (0..100).try_for_each(|_| recorder.write(&empty_row()));
        assert!(matches!(result, Err(RecorderError::IoError(_))));
        assert!(recorder.rows_written() < 100);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should go
        let result = SessionRecorder::open(dir.path(), Schema::Orientation);
        assert!(matches!(result, Err(RecorderError::IoError(_))));
    }
}
