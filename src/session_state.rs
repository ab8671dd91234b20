//! The last-known-value table a session keeps for every sensor, and the
//! [`Row`]s that are snapshotted out of it.

use crate::control::Labels;
use crate::telemetry_decoder::{Fragment, StatusReading};

use chrono::{DateTime, Local};
use log::debug;

/// Number of flex sensors on the glove.
pub const FLEX_SENSORS: usize = 3;

/// Number of MPU6050s on the glove.
pub const ORIENTATION_SENSORS: usize = 2;

/// A value together with whether it has ever been observed. An unset slot
/// still holds the type's default, which is what gets recorded, but tests
/// (and callers) can tell "a true zero" from "never seen".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot<T> {
    value: T,
    set: bool,
}

impl<T> Slot<T> {
    /// Replaces the held value and marks the slot as observed.
    pub fn update(&mut self, value: T) {
        self.value = value;
        self.set = true;
    }

    /// The most recent value, or the default if never observed.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Whether [`Slot::update`] has ever been called.
    pub fn is_set(&self) -> bool {
        self.set
    }
}

/// The recorded part of a flex reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlexSample {
    #[allow(missing_docs)]
    pub adc: i32,
    #[allow(missing_docs)]
    pub angle: i32,
}

/// The recorded angles of an orientation reading, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    #[allow(missing_docs)]
    pub pitch: f64,
    #[allow(missing_docs)]
    pub roll: f64,
    #[allow(missing_docs)]
    pub yaw: f64,
}

/// One slot per fragment kind and sensor. Owned by the accumulator; only
/// ever freshened, never rolled back.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    flex: [Slot<FlexSample>; FLEX_SENSORS],
    attitude: [Slot<Attitude>; ORIENTATION_SENSORS],
    gyro: [Slot<[f64; 3]>; ORIENTATION_SENSORS],
    status: Slot<StatusReading>,
}

/// Maps a 1-based sensor number onto a slot index, if the glove has it.
fn slot_index(sensor: u8, count: usize) -> Option<usize> {
    (sensor as usize)
        .checked_sub(1)
        .filter(|&idx| idx < count)
}

impl SessionState {
    /// An empty table, as at session start.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a fragment into the table. Returns whether any slot changed;
    /// fragments for sensors the glove doesn't have leave the table alone.
    pub fn apply(&mut self, fragment: &Fragment) -> bool {
        match fragment {
            Fragment::Flex(reading) => match slot_index(reading.sensor, FLEX_SENSORS) {
                Some(idx) => {
                    self.flex[idx].update(FlexSample {
                        adc: reading.adc,
                        angle: reading.angle,
                    });
                    true
                }
                None => {
                    debug!("Ignoring reading for unknown flex sensor {}", reading.sensor);
                    false
                }
            },
            Fragment::Orientation(reading) => {
                match slot_index(reading.sensor, ORIENTATION_SENSORS) {
                    Some(idx) => {
                        self.attitude[idx].update(Attitude {
                            pitch: reading.pitch,
                            roll: reading.roll,
                            yaw: reading.yaw,
                        });
                        if let Some(gyro) = reading.gyro {
                            self.gyro[idx].update(gyro);
                        }
                        true
                    }
                    None => {
                        debug!(
                            "Ignoring reading for unknown orientation sensor {}",
                            reading.sensor
                        );
                        false
                    }
                }
            }
            Fragment::Status(status) => {
                self.status.update(status.clone());
                true
            }
            Fragment::Stop => false,
        }
    }

    /// The slot of flex sensor `sensor` (1-based).
    pub fn flex(&self, sensor: u8) -> Option<&Slot<FlexSample>> {
        slot_index(sensor, FLEX_SENSORS).map(|idx| &self.flex[idx])
    }

    /// The attitude slot of orientation sensor `sensor` (1-based).
    pub fn attitude(&self, sensor: u8) -> Option<&Slot<Attitude>> {
        slot_index(sensor, ORIENTATION_SENSORS).map(|idx| &self.attitude[idx])
    }

    /// The gyro slot of orientation sensor `sensor` (1-based).
    pub fn gyro(&self, sensor: u8) -> Option<&Slot<[f64; 3]>> {
        slot_index(sensor, ORIENTATION_SENSORS).map(|idx| &self.gyro[idx])
    }

    /// The latest therapy status.
    pub fn status(&self) -> &Slot<StatusReading> {
        &self.status
    }

    /// Flattens the whole table into a [`Row`], unobserved slots included.
    pub fn snapshot(&self, labels: Labels, timestamp: DateTime<Local>) -> Row {
        Row {
            timestamp,
            flex: self.flex.each_ref().map(|slot| *slot.get()),
            attitude: self.attitude.each_ref().map(|slot| *slot.get()),
            gyro: self.gyro.each_ref().map(|slot| *slot.get()),
            status: self.status.get().clone(),
            labels,
        }
    }
}

/// A complete record for one sampling instant. Sensors are indexed from 0
/// here, so `flex[0]` is `Flex1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// When the row was assembled
    pub timestamp: DateTime<Local>,
    #[allow(missing_docs)]
    pub flex: [FlexSample; FLEX_SENSORS],
    #[allow(missing_docs)]
    pub attitude: [Attitude; ORIENTATION_SENSORS],
    #[allow(missing_docs)]
    pub gyro: [[f64; 3]; ORIENTATION_SENSORS],
    /// The latest phase and countdown
    pub status: StatusReading,
    /// Session labels at the time the row was assembled
    pub labels: Labels,
}
