//! Commands the host writes back to the glove over the serial link.

use std::{fmt, io::Write};

/// A therapy control command understood by the glove firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Start the therapy program from its first phase
    Start,
    /// Freeze the current phase and countdown
    Pause,
    /// Continue a paused program
    Resume,
}

impl DeviceCommand {
    /// The word the firmware listens for.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCommand::Start => "start",
            DeviceCommand::Pause => "pause",
            DeviceCommand::Resume => "resume",
        }
    }

    /// Writes the command, newline terminated, and flushes it out.
    pub fn send_to(&self, mut sink: impl Write) -> std::io::Result<()> {
        writeln!(sink, "{}", self.as_str())?;
        sink.flush()
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
