use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Framing errors
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Grammar errors
    #[error("Segment {name} is not part of this message")]
    InvalidReference { name: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::MalformedFrame`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedFrame {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::malformed("invalid UTF-8").to_string(),
            "Malformed frame: invalid UTF-8"
        );
        assert_eq!(
            Error::FrameTooLarge {
                size: 10,
                max_size: 5
            }
            .to_string(),
            "Frame too large: 10 bytes (max: 5)"
        );
        assert_eq!(
            Error::InvalidReference { name: "PID".into() }.to_string(),
            "Segment PID is not part of this message"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
