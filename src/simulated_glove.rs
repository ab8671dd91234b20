//! A stand-in for the glove that prints plausible firmware output, so the
//! recorder and the therapy monitor can be exercised without hardware.

use crate::line_source::{LineSource, RawLine, ReadOutcome};
use crate::telemetry_decoder::STOP_SENTINEL;

use chrono::Local;
use log::info;
use rand::prelude::*;

use std::f64::consts::PI;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Therapy phases the simulated firmware walks through, with the seconds
/// each one lasts.
const PHASES: [(&str, i32); 4] = [("Grip", 5), ("Hold", 5), ("Release", 3), ("Rest", 4)];

enum Signal {
    Noise(f64),
    Stop,
}

#[derive(Debug, Clone)]
struct Settings {
    cycles: Option<usize>,
    interval: Duration,
    noise: f64,
    six_axis: bool,
    read_timeout: Duration,
}

/// Configures and starts a [`SimulatedGlove`].
#[derive(Debug, Clone)]
pub struct SimulatedGloveBuilder {
    settings: Settings,
}

impl SimulatedGloveBuilder {
    /// Print `STOP` after this many sampling cycles.
    pub fn cycles(mut self, cycles: usize) -> Self {
        self.settings.cycles = Some(cycles);
        self
    }

    /// Time between sampling cycles.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    /// Amplitude of the uniform noise added to every reading.
    pub fn noise(mut self, noise: f64) -> Self {
        self.settings.noise = noise;
        self
    }

    /// Print the six-value gyro + angle MPU format instead of
    /// pitch/roll/yaw.
    pub fn six_axis(mut self, six_axis: bool) -> Self {
        self.settings.six_axis = six_axis;
        self
    }

    /// How long [`LineSource::next_line`] waits before reporting idle.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = read_timeout;
        self
    }

    /// Starts the simulation thread.
    pub fn build(self) -> SimulatedGlove {
        SimulatedGlove::start(self.settings)
    }
}

/// A [`LineSource`] backed by a thread that prints firmware-style lines.
pub struct SimulatedGlove {
    handle: Option<thread::JoinHandle<()>>,
    tx: Sender<Signal>,
    lines: Receiver<String>,
    read_timeout: Duration,
}

impl SimulatedGlove {
    #[allow(missing_docs)]
    pub fn builder() -> SimulatedGloveBuilder {
        SimulatedGloveBuilder {
            settings: Settings {
                cycles: None,
                interval: Duration::from_millis(100),
                noise: 0.5,
                six_axis: false,
                read_timeout: Duration::from_millis(250),
            },
        }
    }

    fn start(settings: Settings) -> Self {
        let (tx, rx) = mpsc::channel::<Signal>();
        let (line_tx, lines) = mpsc::channel::<String>();
        let read_timeout = settings.read_timeout;

        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let mut noise = settings.noise;
            let mut cycle = 0;

            loop {
                if let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::Noise(new_noise) => noise = new_noise,
                        Signal::Stop => break,
                    }
                }

                if settings.cycles.is_some_and(|limit| cycle >= limit) {
                    let _ = line_tx.send(STOP_SENTINEL.to_owned());
                    break;
                }

                for line in cycle_lines(cycle, noise, settings.six_axis, &mut rng) {
                    // the reader hung up; nobody is listening any more
                    if line_tx.send(line).is_err() {
                        return;
                    }
                }
                cycle += 1;
                spin_sleep::sleep(settings.interval);
            }
            info!("Simulated glove stopped after {} cycles", cycle);
        });

        SimulatedGlove {
            handle: Some(handle),
            tx,
            lines,
            read_timeout,
        }
    }

    /// Changes the noise amplitude from the next cycle on.
    pub fn set_noise(&self, noise: f64) {
        let _ = self.tx.send(Signal::Noise(noise));
    }

    /// Stops the simulation thread and waits for it to finish.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimulatedGlove {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LineSource for SimulatedGlove {
    fn next_line(&mut self) -> ReadOutcome {
        match self.lines.recv_timeout(self.read_timeout) {
            Ok(text) => ReadOutcome::Line(RawLine {
                text,
                received_at: Local::now(),
            }),
            Err(RecvTimeoutError::Timeout) => ReadOutcome::Idle,
            Err(RecvTimeoutError::Disconnected) => ReadOutcome::EndOfStream,
        }
    }
}

fn jitter(rng: &mut impl Rng, noise: f64) -> f64 {
    if noise > 0.0 {
        rng.gen_range(-noise..noise)
    } else {
        0.0
    }
}

/// The therapy phase and countdown during `cycle`, at one cycle per second
/// of firmware time.
fn phase_at(cycle: usize) -> (&'static str, i32) {
    let period: i32 = PHASES.iter().map(|(_, secs)| secs).sum();
    let mut t = cycle as i32 % period;
    for (name, secs) in PHASES {
        if t < secs {
            return (name, secs - t);
        }
        t -= secs;
    }
    unreachable!("t is always within one period")
}

/// Everything the firmware prints during one sampling cycle, in the order
/// it prints it.
fn cycle_lines(cycle: usize, noise: f64, six_axis: bool, rng: &mut impl Rng) -> Vec<String> {
    let t = cycle as f64 * 0.1;
    let (phase, countdown) = phase_at(cycle);

    let mut lines = vec![format!("Phase: {} | Countdown: {}", phase, countdown)];

    for sensor in 1..=3 {
        let bend = 45.0 + 45.0 * (t + sensor as f64 * PI / 3.0).sin() + jitter(rng, noise);
        let angle = bend.round() as i32;
        let adc = 1200 + angle * 20;
        lines.push(format!("Flex{}: ADC = {} | Angle: {}°", sensor, adc, angle));
    }

    for (address, offset) in [("0x68", 0.0), ("0x69", PI / 2.0)] {
        let pitch = 30.0 * (t + offset).sin() + jitter(rng, noise);
        let roll = 15.0 * (t + offset).cos() + jitter(rng, noise);
        let yaw = 5.0 * t + jitter(rng, noise);
        if six_axis {
            let gx = 30.0 * (t + offset).cos() + jitter(rng, noise);
            let gy = -15.0 * (t + offset).sin() + jitter(rng, noise);
            let gz = 5.0 + jitter(rng, noise);
            lines.push(format!(
                "MPU6050 at {} | GyroX: {:.2} | GyroY: {:.2} | GyroZ: {:.2} | AngleX: {:.2} | AngleY: {:.2} | AngleZ: {:.2}",
                address, gx, gy, gz, pitch, roll, yaw
            ));
        } else {
            lines.push(format!(
                "MPU6050 at {} | Pitch: {:.2} | Roll: {:.2} | Yaw: {:.2}",
                address, pitch, roll, yaw
            ));
        }
    }

    // firmware chatter the parser has to skip
    lines.push(format!("Loop time: {} ms", 95 + cycle % 10));
    lines
}
