//! Records data glove sessions to CSV.
//!
//! ```text
//! glovelog ports
//! glovelog record --port /dev/ttyUSB0 --schema phase -l object=ball
//! glovelog record --simulate --cycles 50 --headless
//! glovelog record --replay capture.txt --out replayed.csv --headless
//! ```

use clap::Parser;
use rehabglove::{
    args::{GloveArgs, GloveCommand, RecordCommand},
    config::RecorderConfig,
    control::{ControlCommand, SessionControl},
    gui,
    line_source::{self, LineSource, ReaderLineSource, SerialLineSource},
    recorder::SessionRecorder,
    session::{Session, SessionError, SessionSummary, StopReason},
    simulated_glove::SimulatedGlove,
    telemetry_decoder::StatusReading,
};

use chrono::Local;
use log::{info, warn};
use std::{
    error::Error,
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    process::ExitCode,
    sync::{
        mpsc::{sync_channel, Receiver, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// How many status updates may queue up for the display.
const STATUS_QUEUE_LEN: usize = 8;

fn main() -> ExitCode {
    env_logger::init();
    let args = GloveArgs::parse();

    let res = match args.command {
        GloveCommand::Ports => list_ports(),
        GloveCommand::DefaultConfig => RecorderConfig::default()
            .to_ron()
            .map(|text| println!("{}", text))
            .map_err(Into::into),
        GloveCommand::Record(cmd) => record(cmd),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("glovelog: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_ports() -> Result<(), Box<dyn Error>> {
    let ports = line_source::available_ports()?;
    if ports.is_empty() {
        println!("No serial devices found");
    }
    for port in ports {
        println!("{}", port.to_string_lossy());
    }
    Ok(())
}

fn record(cmd: RecordCommand) -> Result<(), Box<dyn Error>> {
    let mut config = match &cmd.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };
    cmd.apply_to(&mut config);
    config.validate()?;

    let path = cmd
        .outfile
        .clone()
        .unwrap_or_else(|| config.output_path(Local::now()));

    let result = if cmd.simulate {
        let mut builder = SimulatedGlove::builder().read_timeout(config.read_timeout());
        if let Some(cycles) = cmd.cycles {
            builder = builder.cycles(cycles);
        }
        run_session(builder.build(), &config, path, cmd.headless)?
    } else if let Some(capture) = &cmd.replay {
        let source = ReaderLineSource::new(BufReader::new(File::open(capture)?));
        run_session(source, &config, path, cmd.headless)?
    } else {
        let Some(port) = choose_port(&config, cmd.headless)? else {
            println!("No serial device chosen, nothing recorded");
            return Ok(());
        };
        let source = SerialLineSource::open(&port, config.baud_rate, config.read_timeout())?;
        run_session(source, &config, path, cmd.headless)?
    };

    let summary = result?;
    let from_serial = !cmd.simulate && cmd.replay.is_none();
    if from_serial && summary.stop_reason == StopReason::EndOfStream {
        eprintln!("glovelog: the glove disconnected, recording ended early");
    }
    println!("{}", summary);
    Ok(())
}

fn choose_port(config: &RecorderConfig, headless: bool) -> Result<Option<PathBuf>, Box<dyn Error>> {
    if let Some(port) = &config.port {
        return Ok(Some(port.clone()));
    }
    if headless {
        return Err("no serial device given; pass --port or set `port` in the config file".into());
    }
    Ok(gui::device_selector(line_source::available_ports()?)?)
}

/// Records from `source` to `path` on a worker thread, driven either by the
/// control panel or by commands on stdin.
fn run_session<S: LineSource + Send + 'static>(
    source: S,
    config: &RecorderConfig,
    path: PathBuf,
    headless: bool,
) -> Result<Result<SessionSummary, SessionError>, Box<dyn Error>> {
    let recorder = SessionRecorder::open(&path, config.schema)?;
    let control = Arc::new(SessionControl::new(config.labels.clone()));
    let (status_tx, status_rx) = sync_channel(STATUS_QUEUE_LEN);

    let session = Session::new(source, recorder, control.clone(), config.trigger_sensor)
        .with_status_channel(status_tx);
    let worker = thread::spawn(move || session.run());

    if headless {
        spawn_command_reader(control);
        Ok(wait_headless(status_rx, worker)?)
    } else {
        let target = path.to_string_lossy();
        Ok(gui::session_panel(control, status_rx, &target, worker)?)
    }
}

/// Applies `pause`, `resume key=value ...` and `stop` commands typed on
/// stdin.
fn spawn_command_reader(control: Arc<SessionControl>) {
    println!("Recording. Commands: pause | resume [key=value ...] | stop");
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    control.apply(&command);
                    if command == ControlCommand::Stop {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });
}

/// Logs therapy status until the worker finishes.
fn wait_headless(
    status_rx: Receiver<StatusReading>,
    worker: JoinHandle<Result<SessionSummary, SessionError>>,
) -> Result<Result<SessionSummary, SessionError>, Box<dyn Error>> {
    let mut last_phase = String::new();
    while !worker.is_finished() {
        match status_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(status) => {
                if status.phase != last_phase {
                    info!("Phase {} ({}s)", status.phase, status.countdown);
                    last_phase = status.phase;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // the session dropped its sender, so it's done
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    worker
        .join()
        .map_err(|_| "the recording thread panicked".into())
}
