//! Therapy monitor: shows the phase and countdown the glove is running and
//! lets the therapist start, pause and resume the program.

mod gui;

use clap::Parser;
use rehabglove::{
    args::MonitorArgs,
    device_command::DeviceCommand,
    gui::device_selector,
    line_source::{self, LineSource, ReadOutcome, SerialLineSource, DEFAULT_READ_TIMEOUT},
    simulated_glove::SimulatedGlove,
    telemetry_decoder::{self, Fragment},
};

use gui::{engage_gui, MonitorEvent};
use log::info;
use std::{
    error::Error,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

fn main() -> ExitCode {
    env_logger::init();
    let args = MonitorArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("monitor: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: MonitorArgs) -> Result<(), Box<dyn Error>> {
    if args.simulate {
        let glove = SimulatedGlove::builder()
            .interval(Duration::from_secs(1))
            .noise(0.0)
            .build();
        return watch(glove, |command| {
            info!("The simulated glove ignores {}", command);
            Ok(())
        });
    }

    let port = match args.port {
        Some(port) => port,
        None => match device_selector(line_source::available_ports()?)? {
            Some(port) => port,
            None => return Ok(()),
        },
    };
    let source = SerialLineSource::open(port, args.baud_rate, DEFAULT_READ_TIMEOUT)?;
    let serial = source.port();
    watch(source, move |command| {
        info!("Sending {}", command);
        command.send_to(&*serial)
    })
}

/// Reads `source` on a worker thread and shows what it reports until the
/// user quits.
fn watch<S, F>(source: S, send: F) -> Result<(), Box<dyn Error>>
where
    S: LineSource + Send + 'static,
    F: FnMut(DeviceCommand) -> std::io::Result<()>,
{
    let running = Arc::new(AtomicBool::new(true));
    let (event_tx, event_rx) = mpsc::channel();

    let worker_running = running.clone();
    let worker = thread::spawn(move || read_status(source, &worker_running, event_tx));

    let res = engage_gui(event_rx, send);

    running.store(false, Ordering::SeqCst);
    let _ = worker.join();
    res
}

fn read_status(mut source: impl LineSource, running: &AtomicBool, event_tx: Sender<MonitorEvent>) {
    while running.load(Ordering::SeqCst) {
        let line = match source.next_line() {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Idle => continue,
            ReadOutcome::EndOfStream => {
                let _ = event_tx.send(MonitorEvent::Disconnected);
                return;
            }
        };
        let event = match telemetry_decoder::parse(&line.text) {
            Some(Fragment::Status(status)) => MonitorEvent::Status(status),
            Some(Fragment::Stop) => MonitorEvent::Finished,
            _ => continue,
        };
        if event_tx.send(event).is_err() {
            return;
        }
    }
}
