//! Decodes the human-readable diagnostic lines that the glove firmware
//! prints on its serial link into typed [`Fragment`]s.
//!
//! The firmware mixes several kinds of output on one stream:
//!
//! ```text
//! Flex1: ADC = 512 | Angle: 45°
//! MPU6050 at 0x68 | Pitch: 1.00 | Roll: 2.00 | Yaw: 3.00
//! MPU6050 at 0x69 | GyroX: 0.1 | GyroY: 0.2 | GyroZ: 0.3 | AngleX: 4.0 | AngleY: 5.0 | AngleZ: 6.0
//! Phase: Grip | Countdown: 5
//! STOP
//! ```
//!
//! Each kind is routed by a key substring and handed to its own matcher, so
//! a change in the firmware's phrasing touches a single matcher. Truncated
//! and garbled lines are expected on this link; a line whose key matches but
//! whose payload doesn't parse is rejected whole, never half-populated.

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{char, i32, space0, u8},
    combinator::{all_consuming, map_parser, rest},
    number::complete::double,
    sequence::{delimited, pair, preceded, tuple},
    Finish, IResult,
};

use std::{fmt, str::FromStr};

/// The literal line the firmware prints when a session should end.
pub const STOP_SENTINEL: &str = "STOP";

const FLEX_KEY: &str = "Flex";
const ADC_MARKER: &str = "ADC = ";
const ANGLE_MARKER: &str = "Angle: ";
const DEGREE_MARK: &str = "°";

const FIELD_SEPARATOR: &str = " | ";
const LABEL_SEPARATOR: &str = ": ";

const PHASE_KEY: &str = "Phase:";
const COUNTDOWN_KEY: &str = "Countdown:";

/// I2C address tokens of the two MPU6050s, and the sensor number each one
/// is recorded under.
const ORIENTATION_KEYS: [(&str, u8); 2] = [("MPU6050 at 0x68", 1), ("MPU6050 at 0x69", 2)];

/// A single flex sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexReading {
    /// Sensor number as printed by the firmware (`Flex<N>:`)
    pub sensor: u8,
    /// Raw ADC count
    pub adc: i32,
    /// Bend angle in whole degrees
    pub angle: i32,
}

/// A single MPU6050 sample. The three-value form carries pitch, roll and
/// yaw. The six-value form carries gyro x, y, z followed by angle x, y, z;
/// the angles land in `pitch`, `roll` and `yaw` in that order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationReading {
    /// 1 for the sensor at 0x68, 2 for the sensor at 0x69
    pub sensor: u8,
    /// Degrees
    pub pitch: f64,
    /// Degrees
    pub roll: f64,
    /// Degrees
    pub yaw: f64,
    /// Angular rates, only present in the six-value form
    pub gyro: Option<[f64; 3]>,
}

/// The therapy phase the firmware is in and the seconds left in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReading {
    /// Phase name, e.g. `Grip` or `Rest`
    pub phase: String,
    /// Seconds remaining in the phase
    pub countdown: i32,
}

/// One decoded piece of telemetry extracted from a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// `Flex<N>: ADC = <int> | Angle: <int>°`
    Flex(FlexReading),
    /// `MPU6050 at 0x6? | label: value | ...`
    Orientation(OrientationReading),
    /// `Phase: <text> | Countdown: <int>`
    Status(StatusReading),
    /// The [`STOP_SENTINEL`] line
    Stop,
}

/// Which matcher a line was routed to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Flex,
    Orientation,
    Status,
}

/// Why a line did not turn into a [`Fragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentParseError {
    /// The line carries none of the known keys.
    Unrecognized(String),
    /// The line carries a known key but its payload is malformed.
    Malformed {
        /// The matcher that rejected the line
        kind: FragmentKind,
        /// The unparsed remainder at the point of failure
        input: String,
    },
}

impl fmt::Display for FragmentParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unrecognized(line) => write!(f, "unrecognized line {:?}", line),
            Self::Malformed { kind, input } => {
                write!(f, "malformed {:?} payload near {:?}", kind, input)
            }
        }
    }
}

impl std::error::Error for FragmentParseError {}

fn malformed(kind: FragmentKind) -> impl Fn(nom::error::Error<&str>) -> FragmentParseError {
    move |e: nom::error::Error<&str>| FragmentParseError::Malformed {
        kind,
        input: e.input.to_owned(),
    }
}

/// An integer that is the whole of its (whitespace padded) input.
fn whole_i32(s: &str) -> IResult<&str, i32> {
    all_consuming(delimited(space0, i32, space0))(s)
}

/// Skips ahead to just past `marker`.
fn skip_past<'a>(marker: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    preceded(take_until(marker), tag(marker))
}

fn flex_sensor_id(s: &str) -> IResult<&str, u8> {
    delimited(tag(FLEX_KEY), u8, char(':'))(s)
}

fn flex_payload(s: &str) -> IResult<&str, (i32, i32)> {
    tuple((
        preceded(
            skip_past(ADC_MARKER),
            map_parser(alt((take_until(FIELD_SEPARATOR), rest)), whole_i32),
        ),
        preceded(
            skip_past(ANGLE_MARKER),
            map_parser(take_until(DEGREE_MARK), whole_i32),
        ),
    ))(s)
}

fn labelled_value(s: &str) -> IResult<&str, f64> {
    all_consuming(preceded(
        skip_past(LABEL_SEPARATOR),
        delimited(space0, double, space0),
    ))(s)
}

fn status_payload(s: &str) -> IResult<&str, (&str, i32)> {
    tuple((
        preceded(skip_past(PHASE_KEY), take_until("|")),
        preceded(
            pair(char('|'), skip_past(COUNTDOWN_KEY)),
            map_parser(alt((take_until("|"), rest)), whole_i32),
        ),
    ))(s)
}

/// Finds a `Flex<N>:` key anywhere in the line, returning `N` and the text
/// that follows the key.
fn find_flex_key(line: &str) -> Option<(u8, &str)> {
    line.match_indices(FLEX_KEY)
        .find_map(|(idx, _)| flex_sensor_id(&line[idx..]).ok())
        .map(|(remaining, sensor)| (sensor, remaining))
}

fn find_orientation_key(line: &str) -> Option<u8> {
    ORIENTATION_KEYS
        .iter()
        .find(|(key, _)| line.contains(key))
        .map(|&(_, sensor)| sensor)
}

fn decode_flex(sensor: u8, payload: &str) -> Result<FlexReading, FragmentParseError> {
    let (_, (adc, angle)) = flex_payload(payload)
        .finish()
        .map_err(malformed(FragmentKind::Flex))?;
    Ok(FlexReading { sensor, adc, angle })
}

fn decode_orientation(sensor: u8, line: &str) -> Result<OrientationReading, FragmentParseError> {
    let values = line
        .split(FIELD_SEPARATOR)
        .skip(1)
        .map(|segment| labelled_value(segment).finish().map(|(_, v)| v))
        .collect::<Result<Vec<f64>, _>>()
        .map_err(malformed(FragmentKind::Orientation))?;

    match values[..] {
        [pitch, roll, yaw] => Ok(OrientationReading {
            sensor,
            pitch,
            roll,
            yaw,
            gyro: None,
        }),
        [gx, gy, gz, ax, ay, az] => Ok(OrientationReading {
            sensor,
            pitch: ax,
            roll: ay,
            yaw: az,
            gyro: Some([gx, gy, gz]),
        }),
        _ => Err(FragmentParseError::Malformed {
            kind: FragmentKind::Orientation,
            input: format!("{} values", values.len()),
        }),
    }
}

fn decode_status(line: &str) -> Result<StatusReading, FragmentParseError> {
    let (_, (phase, countdown)) = status_payload(line)
        .finish()
        .map_err(malformed(FragmentKind::Status))?;
    Ok(StatusReading {
        phase: phase.trim().to_owned(),
        countdown,
    })
}

impl FromStr for Fragment {
    type Err = FragmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();

        if line == STOP_SENTINEL {
            return Ok(Fragment::Stop);
        }
        if let Some((sensor, payload)) = find_flex_key(line) {
            return decode_flex(sensor, payload).map(Fragment::Flex);
        }
        if let Some(sensor) = find_orientation_key(line) {
            return decode_orientation(sensor, line).map(Fragment::Orientation);
        }
        if line.contains(PHASE_KEY) && line.contains(COUNTDOWN_KEY) {
            return decode_status(line).map(Fragment::Status);
        }

        Err(FragmentParseError::Unrecognized(line.to_owned()))
    }
}

/// Attempts to recognize a single line of telemetry. Anything that isn't a
/// well-formed fragment is dropped here, so callers never see parse errors.
pub fn parse(line: &str) -> Option<Fragment> {
    match line.parse::<Fragment>() {
        Ok(fragment) => Some(fragment),
        Err(e) => {
            debug!("Dropping telemetry line: {}", e);
            None
        }
    }
}
