//! Column layouts of the CSV files a session can produce. Every layout
//! starts with a timestamp and ends with the session labels it collects;
//! which one to use depends on the firmware build on the glove and on the
//! dataset being collected.

use crate::session_state::Row;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const UPLOAD_TIMESTAMP_FORMAT: &str = "%H:%M:%S";
const PHASE_TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

const FLEX_COLUMNS: [&str; 6] = [
    "Flex1_ADC",
    "Flex1_Angle",
    "Flex2_ADC",
    "Flex2_Angle",
    "Flex3_ADC",
    "Flex3_Angle",
];

/// A CSV layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Schema {
    /// Flex sensors plus pitch/roll/yaw of both MPUs, with gesture and
    /// object labels.
    #[default]
    Orientation,
    /// Flex sensors plus gyro rates and angles of both MPUs, with an extra
    /// upload-time column and gesture and object labels.
    Gyro,
    /// Pitch/roll/yaw of the second MPU only, with phase, grip type and
    /// object labels.
    Phase,
}

fn float(v: f64) -> String {
    // Debug keeps the fractional part on whole numbers ("1.0", not "1")
    format!("{:?}", v)
}

impl Schema {
    /// The header row.
    pub fn header(&self) -> Vec<&'static str> {
        match self {
            Schema::Orientation => [
                &["Timestamp"][..],
                &FLEX_COLUMNS[..],
                &[
                    "MPU1_Pitch",
                    "MPU1_Roll",
                    "MPU1_Yaw",
                    "MPU2_Pitch",
                    "MPU2_Roll",
                    "MPU2_Yaw",
                    "Gesture_Name",
                    "Object_Used",
                ][..],
            ]
            .concat(),
            Schema::Gyro => [
                &["Timestamp", "Upload_Timestamp"][..],
                &FLEX_COLUMNS[..],
                &[
                    "MPU1_GyroX",
                    "MPU1_GyroY",
                    "MPU1_GyroZ",
                    "MPU1_AngleX",
                    "MPU1_AngleY",
                    "MPU1_AngleZ",
                    "MPU2_GyroX",
                    "MPU2_GyroY",
                    "MPU2_GyroZ",
                    "MPU2_AngleX",
                    "MPU2_AngleY",
                    "MPU2_AngleZ",
                    "Gesture_Name",
                    "Object_Used",
                ][..],
            ]
            .concat(),
            Schema::Phase => vec![
                "Timestamp",
                "MPU2_Pitch",
                "MPU2_Roll",
                "MPU2_Yaw",
                "Phase",
                "Grip_Type",
                "Object",
            ],
        }
    }

    /// Flattens `row` into fields lined up with [`Schema::header`].
    pub fn record(&self, row: &Row) -> Vec<String> {
        let flex = row
            .flex
            .iter()
            .flat_map(|f| [f.adc.to_string(), f.angle.to_string()]);

        match self {
            Schema::Orientation => {
                let mut fields = vec![row.timestamp.format(TIMESTAMP_FORMAT).to_string()];
                fields.extend(flex);
                fields.extend(
                    row.attitude
                        .iter()
                        .flat_map(|a| [float(a.pitch), float(a.roll), float(a.yaw)]),
                );
                fields.push(row.labels.gesture.clone());
                fields.push(row.labels.object.clone());
                fields
            }
            Schema::Gyro => {
                let mut fields = vec![
                    row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    row.timestamp.format(UPLOAD_TIMESTAMP_FORMAT).to_string(),
                ];
                fields.extend(flex);
                for (gyro, attitude) in row.gyro.iter().zip(&row.attitude) {
                    fields.extend(gyro.iter().copied().map(float));
                    fields.extend([
                        float(attitude.pitch),
                        float(attitude.roll),
                        float(attitude.yaw),
                    ]);
                }
                fields.push(row.labels.gesture.clone());
                fields.push(row.labels.object.clone());
                fields
            }
            Schema::Phase => {
                let second = &row.attitude[1];
                vec![
                    row.timestamp.format(PHASE_TIMESTAMP_FORMAT).to_string(),
                    float(second.pitch),
                    float(second.roll),
                    float(second.yaw),
                    row.labels.phase.clone(),
                    row.labels.grip_type.clone(),
                    row.labels.object.clone(),
                ]
            }
        }
    }
}
