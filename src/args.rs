//! Commandline argument parsers using clap, for the recorder and the
//! therapy monitor

use crate::config::RecorderConfig;
use crate::schema::Schema;
use crate::session_state::ORIENTATION_SENSORS;

use clap::{Args, Parser, Subcommand};

use std::{collections::HashMap, path::PathBuf};

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
/// Records data glove telemetry to CSV files
pub struct GloveArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: GloveCommand,
}

#[derive(Debug, Subcommand, Clone)]
/// Tasks the recorder can perform
pub enum GloveCommand {
    /// Record a session from the glove (or a stand-in) to a CSV file
    #[command(about)]
    Record(RecordCommand),

    /// List the serial devices on this machine
    #[command(about)]
    Ports,

    /// Print the default configuration, as a starting point for a config
    /// file
    #[command(about)]
    DefaultConfig,
}

#[derive(Debug, Args, Clone, Default)]
#[command(version, about)]
/// Options for a recording session. Anything not given here comes from the
/// config file, or from the built-in defaults.
pub struct RecordCommand {
    /// RON config file to read settings from
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Serial device the glove is connected to
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Baud rate of the serial link
    #[arg(short = 'b', long = "baud")]
    pub baud_rate: Option<u32>,

    /// File to write to, instead of a timestamped file in the output
    /// directory
    #[arg(short = 'o', long = "out")]
    pub outfile: Option<PathBuf>,

    /// Column layout of the output file
    #[arg(short = 's', long = "schema", value_enum)]
    pub schema: Option<Schema>,

    /// Orientation sensor whose reading completes a row
    #[arg(short = 't', long = "trigger", value_parser = clap::value_parser!(u8).range(1..=ORIENTATION_SENSORS as i64))]
    pub trigger_sensor: Option<u8>,

    /// Initial labels, as key=value
    #[arg(short = 'l', long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    /// Read pause/resume/stop commands from stdin instead of showing the
    /// control panel
    #[arg(long)]
    pub headless: bool,

    /// Record from a simulated glove instead of a serial device
    #[arg(long, conflicts_with_all = ["port", "replay"])]
    pub simulate: bool,

    /// Stop the simulated glove after this many sampling cycles
    #[arg(long, requires = "simulate")]
    pub cycles: Option<usize>,

    /// Record from a capture of a previous session's serial output
    #[arg(long, conflicts_with = "port")]
    pub replay: Option<PathBuf>,
}

fn parse_label(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got {:?}", arg))
}

impl RecordCommand {
    /// Applies the flags that were given on top of `config`.
    pub fn apply_to(&self, config: &mut RecorderConfig) {
        if let Some(port) = &self.port {
            config.port = Some(port.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(schema) = self.schema {
            config.schema = schema;
        }
        if let Some(trigger_sensor) = self.trigger_sensor {
            config.trigger_sensor = trigger_sensor;
        }
        if !self.labels.is_empty() {
            let labels: HashMap<String, String> = self.labels.iter().cloned().collect();
            config.labels.apply(&labels);
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
/// Shows the glove's therapy phase and countdown, and sends it commands
pub struct MonitorArgs {
    /// Serial device the glove is connected to. Chosen from a list when not
    /// given.
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Baud rate of the serial link
    #[arg(short = 'b', long = "baud", default_value_t = crate::line_source::DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Watch a simulated glove instead of a serial device
    #[arg(long, conflicts_with = "port")]
    pub simulate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(args: &[&str]) -> RecordCommand {
        let args = GloveArgs::try_parse_from([&["glovelog", "record"][..], args].concat()).unwrap();
        match args.command {
            GloveCommand::Record(cmd) => cmd,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cmd = record(&[
            "--port",
            "/dev/ttyUSB1",
            "--schema",
            "gyro",
            "-l",
            "gesture=fist",
            "-l",
            "object=cup",
        ]);

        let mut config = RecorderConfig::from_ron("(baud_rate: 9600, schema: Phase)").unwrap();
        config.labels.object = "ball".to_owned();
        cmd.apply_to(&mut config);

        assert_eq!(config.port, Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.schema, Schema::Gyro);
        assert_eq!(config.labels.gesture, "fist");
        assert_eq!(config.labels.object, "cup");
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let mut config = RecorderConfig::default();
        config.trigger_sensor = 1;
        let before = config.clone();
        record(&[]).apply_to(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(GloveArgs::try_parse_from(["glovelog", "record", "-l", "fist"]).is_err());
        assert!(GloveArgs::try_parse_from([
            "glovelog",
            "record",
            "--simulate",
            "--port",
            "/dev/ttyUSB0"
        ])
        .is_err());
        assert!(GloveArgs::try_parse_from(["glovelog", "record", "--cycles", "3"]).is_err());
        for trigger in ["0", "3"] {
            assert!(GloveArgs::try_parse_from(["glovelog", "record", "--trigger", trigger]).is_err());
        }
        assert_eq!(record(&["--trigger", "1"]).trigger_sensor, Some(1));
    }

    #[test]
    fn test_monitor_defaults() {
        let args = MonitorArgs::try_parse_from(["monitor"]).unwrap();
        assert_eq!(args.baud_rate, 115200);
        assert!(!args.simulate);
    }
}
