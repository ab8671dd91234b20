use std::{error::Error, fmt::Display};

/// Returned when a terminal screen fails to draw, or loses track of the
/// worker it is showing.
#[derive(Debug)]
pub enum GloveGuiError {
    /// Drawing to or reading from the terminal failed
    IOError(std::io::Error),
    /// The worker panicked
    JoinError,
}

impl Display for GloveGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::JoinError => write!(f, "worker thread panicked"),
        }
    }
}

impl Error for GloveGuiError {}

impl From<std::io::Error> for GloveGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_convert() {
        let err: GloveGuiError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "tty gone").into();
        assert!(matches!(err, GloveGuiError::IOError(_)));
        assert_eq!(err.to_string(), "terminal error: tty gone");
        assert_eq!(GloveGuiError::JoinError.to_string(), "worker thread panicked");
    }
}
