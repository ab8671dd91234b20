//! Merges [`Fragment`]s into complete [`Row`]s.

use crate::control::Labels;
use crate::session_state::{Row, SessionState};
use crate::telemetry_decoder::Fragment;

use chrono::Local;

/// The firmware prints the sensor at 0x68 before the one at 0x69 every
/// cycle, so the second sensor's reading closes the cycle.
pub const DEFAULT_TRIGGER_SENSOR: u8 = 2;

/// The `SessionAccumulator` consumes fragments and keeps the last known
/// value of every sensor. When the orientation reading of the trigger
/// sensor arrives, it snapshots everything it knows into a [`Row`].
///
/// If the trigger sensor never reports (say it came unplugged), no row is
/// ever produced.
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    state: SessionState,
    trigger_sensor: u8,
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_SENSOR)
    }
}

impl SessionAccumulator {
    /// Instantiates a new `SessionAccumulator` with empty state, completing
    /// rows on orientation readings from `trigger_sensor`.
    pub fn new(trigger_sensor: u8) -> Self {
        Self {
            state: SessionState::new(),
            trigger_sensor,
        }
    }

    /// Folds `fragment` into the session state. Returns a row, stamped now
    /// and carrying the labels `labels` produces, if `fragment` completes
    /// one. `labels` is only called when a row is completed.
    pub fn ingest(&mut self, fragment: &Fragment, labels: impl FnOnce() -> Labels) -> Option<Row> {
        let updated = self.state.apply(fragment);

        match fragment {
            Fragment::Orientation(reading) if updated && reading.sensor == self.trigger_sensor => {
                Some(self.state.snapshot(labels(), Local::now()))
            }
            _ => None,
        }
    }

    /// The last known values.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[allow(missing_docs)]
    pub fn trigger_sensor(&self) -> u8 {
        self.trigger_sensor
    }
}
