//! Terminal screens for choosing a serial port and driving a recording
//! session.

mod device_selector;
mod error;
mod session_panel;

pub use device_selector::device_selector;
pub use error::GloveGuiError;
pub use session_panel::session_panel;
