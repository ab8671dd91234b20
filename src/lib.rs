//! RehabGlove is a sensor glove for hand rehabilitation. Three flex sensors
//! measure finger bend and two MPU6050 IMUs track the attitude of the hand,
//! while the glove's firmware walks the patient through timed therapy
//! phases. Everything the glove measures is printed, one reading per line,
//! over its serial link.
//!
//! This is the host-side software that turns that stream into datasets:
//! lines are decoded into typed fragments ([telemetry_decoder]), merged
//! into a last-known-value table ([session_state]), snapshotted into rows
//! whenever the hand's attitude is reported ([session_accumulator]) and
//! appended to a CSV file ([recorder]). A recording [session] can be paused,
//! relabelled and stopped from another thread through its
//! [control::SessionControl].
//!
//! Two binaries are built on top: `glovelog`, which records sessions, and
//! `monitor`, which shows the therapy phase and sends commands back to the
//! glove.

#![warn(missing_docs)]
pub mod args;
pub mod config;
pub mod control;
pub mod device_command;
pub mod gui;
pub mod line_source;
pub mod recorder;
pub mod schema;
pub mod session;
pub mod session_accumulator;
pub mod session_state;
pub mod simulated_glove;
pub mod telemetry_decoder;
