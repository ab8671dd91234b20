//! Recorder settings, read from an optional [ron] file.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```text
//! (
//!     port: Some("/dev/ttyUSB0"),
//!     schema: Phase,
//!     labels: (object: "ball"),
//! )
//! ```
//!
//! Command line flags are applied on top of whatever the file says.

use crate::control::Labels;
use crate::line_source::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
use crate::schema::Schema;
use crate::session_accumulator::DEFAULT_TRIGGER_SENSOR;
use crate::session_state::ORIENTATION_SENSORS;

use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};

use std::{
    borrow::Cow,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Returned when a config file can't be read or doesn't parse.
#[derive(Debug)]
pub enum ConfigError {
    /// Returned when reading the file fails.
    IoError(std::io::Error),

    /// Returned when the file isn't a valid config.
    RonSpannedError(ron::de::SpannedError),

    /// Returned when serializing a config fails.
    RonError(ron::Error),

    /// Returned when the trigger sensor isn't one the glove has.
    InvalidTriggerSensor(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ConfigError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ConfigError::RonSpannedError(error) => Cow::from(format!("invalid config: {}", error)),
            ConfigError::RonError(error) => Cow::from(format!("ron error: {}", error)),
            ConfigError::InvalidTriggerSensor(sensor) => Cow::from(format!(
                "trigger_sensor {} is not an orientation sensor, expected 1 to {}",
                sensor, ORIENTATION_SENSORS
            )),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

/// Everything a recording session needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Serial device to read; asked for interactively when unset
    pub port: Option<PathBuf>,
    #[allow(missing_docs)]
    pub baud_rate: u32,
    /// How long one serial read may block
    pub read_timeout_ms: u64,
    /// Directory new session files are created in
    pub output_dir: PathBuf,
    /// Session files are named `<file_prefix>_<start time>.csv`
    pub file_prefix: String,
    /// Column layout of session files
    pub schema: Schema,
    /// Orientation sensor whose reading completes a row
    pub trigger_sensor: u8,
    /// Labels the session starts with
    pub labels: Labels,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            output_dir: PathBuf::from("data"),
            file_prefix: "glove_data".to_owned(),
            schema: Schema::default(),
            trigger_sensor: DEFAULT_TRIGGER_SENSOR,
            labels: Labels::default(),
        }
    }
}

impl RecorderConfig {
    /// Reads a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config = Self::from_ron(&text)?;
        debug!("Loaded {:#?} from {}", config, path.display());
        Ok(config)
    }

    /// Parses a config from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that parse but can't produce a recording. A
    /// trigger sensor the glove doesn't have would never complete a row.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=ORIENTATION_SENSORS).contains(&(self.trigger_sensor as usize)) {
            return Err(ConfigError::InvalidTriggerSensor(self.trigger_sensor));
        }
        Ok(())
    }

    /// The config as pretty-printed RON, e.g. to start a config file from.
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)
    }

    #[allow(missing_docs)]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Where a session started at `started` is recorded.
    pub fn output_path(&self, started: DateTime<Local>) -> PathBuf {
        self.output_dir.join(session_file_name(&self.file_prefix, started))
    }
}

/// `<prefix>_<YYYY-MM-DD_HH-MM-SS>.csv`
pub fn session_file_name(prefix: &str, started: DateTime<Local>) -> String {
    format!("{}_{}.csv", prefix, started.format(FILE_TIMESTAMP_FORMAT))
}
