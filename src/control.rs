//! The control surface of a recording session.
//!
//! A [`SessionControl`] is shared (behind an `Arc`) between the worker that
//! reads the glove and whatever drives the session: the terminal panel, a
//! stdin reader, or a test. Every field is an independent last-write-wins
//! cell, so commands never block the reading loop.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// Free-form metadata recorded alongside every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    /// Gesture being performed
    pub gesture: String,
    /// Object being gripped
    pub object: String,
    /// Therapy phase, as entered by the operator
    pub phase: String,
    /// Grip type
    pub grip_type: String,
}

impl Labels {
    /// Overwrites the labels named in `updates`. Keys are `gesture`,
    /// `object`, `phase` and `grip_type`; anything else is ignored.
    pub fn apply(&mut self, updates: &HashMap<String, String>) {
        for (key, value) in updates {
            match key.as_str() {
                "gesture" => self.gesture = value.clone(),
                "object" => self.object = value.clone(),
                "phase" => self.phase = value.clone(),
                "grip_type" => self.grip_type = value.clone(),
                other => warn!("Ignoring unknown label {:?}", other),
            }
        }
    }
}

/// Flags and labels shared between the reading worker and the control
/// surface.
#[derive(Debug)]
pub struct SessionControl {
    running: AtomicBool,
    paused: AtomicBool,
    labels: Mutex<Labels>,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new(Labels::default())
    }
}

impl SessionControl {
    /// A running, unpaused session starting with `labels`.
    pub fn new(labels: Labels) -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            labels: Mutex::new(labels),
        }
    }

    /// Suppresses row writes. Sensor state keeps updating.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Logging paused");
    }

    /// Applies label updates, then lifts the pause.
    pub fn resume(&self, labels: &HashMap<String, String>) {
        // labels stay valid even if another writer panicked
        let mut current = self.labels.lock().unwrap_or_else(|e| e.into_inner());
        current.apply(labels);
        drop(current);

        self.paused.store(false, Ordering::SeqCst);
        info!("Logging resumed");
    }

    /// Asks the reading loop to finish. It notices at its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Stop requested");
    }

    #[allow(missing_docs)]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    #[allow(missing_docs)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A copy of the current labels.
    pub fn labels(&self) -> Labels {
        self.labels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Carries out a parsed [`ControlCommand`].
    pub fn apply(&self, command: &ControlCommand) {
        match command {
            ControlCommand::Pause => self.pause(),
            ControlCommand::Resume(labels) => self.resume(labels),
            ControlCommand::Stop => self.stop(),
        }
    }
}

/// A text command, as typed on stdin when recording headless:
///
/// ```text
/// pause
/// resume gesture=fist object=ball
/// stop
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    #[allow(missing_docs)]
    Pause,
    /// Label updates to apply while resuming
    Resume(HashMap<String, String>),
    #[allow(missing_docs)]
    Stop,
}

/// Returned when a line isn't a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommandError {
    /// Blank input
    Empty,
    /// The first word isn't `pause`, `resume` or `stop`
    UnknownCommand(String),
    /// A `resume` argument without an `=`
    BadLabel(String),
}

impl fmt::Display for ControlCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::UnknownCommand(cmd) => {
                write!(f, "unknown command {:?}, expected pause, resume or stop", cmd)
            }
            Self::BadLabel(arg) => write!(f, "expected key=value, got {:?}", arg),
        }
    }
}

impl std::error::Error for ControlCommandError {}

impl FromStr for ControlCommand {
    type Err = ControlCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().ok_or(ControlCommandError::Empty)?;

        match command.to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "stop" => Ok(Self::Stop),
            "resume" => words
                .map(|arg| {
                    arg.split_once('=')
                        .map(|(k, v)| (k.to_owned(), v.to_owned()))
                        .ok_or_else(|| ControlCommandError::BadLabel(arg.to_owned()))
                })
                .collect::<Result<HashMap<_, _>, _>>()
                .map(Self::Resume),
            _ => Err(ControlCommandError::UnknownCommand(command.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_pause_resume_stop() {
        let control = SessionControl::default();
        assert!(control.is_running());
        assert!(!control.is_paused());

        control.pause();
        assert!(control.is_paused());

        control.resume(&labels(&[("gesture", "fist"), ("object", "ball")]));
        assert!(!control.is_paused());
        assert_eq!(control.labels().gesture, "fist");
        assert_eq!(control.labels().object, "ball");
        assert_eq!(control.labels().phase, "");

        control.stop();
        assert!(!control.is_running());
    }

    #[test]
    fn test_resume_keeps_unnamed_labels() {
        let control = SessionControl::new(Labels {
            gesture: "pinch".to_owned(),
            grip_type: "tripod".to_owned(),
            ..Labels::default()
        });
        control.resume(&labels(&[("phase", "Hold"), ("colour", "red")]));
        let current = control.labels();
        assert_eq!(current.gesture, "pinch");
        assert_eq!(current.grip_type, "tripod");
        assert_eq!(current.phase, "Hold");
    }

    #[test]
    fn test_last_write_wins_across_threads() {
        let control = std::sync::Arc::new(SessionControl::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let control = control.clone();
                std::thread::spawn(move || {
                    let object = format!("cup{}", i);
                    control.resume(&labels(&[("object", object.as_str())]));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(control.labels().object.starts_with("cup"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("pause".parse::<ControlCommand>(), Ok(ControlCommand::Pause));
        assert_eq!("  STOP ".parse::<ControlCommand>(), Ok(ControlCommand::Stop));
        assert_eq!(
            "resume gesture=fist object=ball".parse::<ControlCommand>(),
            Ok(ControlCommand::Resume(labels(&[
                ("gesture", "fist"),
                ("object", "ball")
            ])))
        );
        assert_eq!(
            "resume".parse::<ControlCommand>(),
            Ok(ControlCommand::Resume(HashMap::new()))
        );
        assert_eq!(
            "".parse::<ControlCommand>(),
            Err(ControlCommandError::Empty)
        );
        assert_eq!(
            "resume fist".parse::<ControlCommand>(),
            Err(ControlCommandError::BadLabel("fist".to_owned()))
        );
        assert!(matches!(
            "jump".parse::<ControlCommand>(),
            Err(ControlCommandError::UnknownCommand(_))
        ));
    }
}
