/*!
    Error types for the framereader crates.
*/

use thiserror::Error;

/**
    Error type for the framereader crates.

    Every error is reported through the call that triggered it. Errors that
    terminate a stream or encoder never affect siblings sharing the same
    decoder context.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// The requested hardware backend is not available on this system.
    #[error("unsupported backend: {message}")]
    UnsupportedBackend { message: String },

    /// A hardware device exists but could not be bound.
    #[error("device initialisation failed: {message}")]
    DeviceInitFailed { message: String },

    /// The container could not be opened, read or seeked.
    #[error("container error: {message}")]
    Container { message: String },

    /// The decoder rejected data it was given.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Crop, scale, format or other options are unusable.
    #[error("invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// A frame was sent to the encoder out of presentation order.
    #[error("frame timestamp {timestamp} is not after the last accepted timestamp {last}")]
    OutOfOrder { timestamp: i64, last: i64 },

    /// No encoder backend is available for the requested codec.
    #[error("unsupported codec: {message}")]
    UnsupportedCodec { message: String },

    /// A picture layout this crate cannot represent.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// The encoder backend failed.
    #[error("encode error: {message}")]
    Encode { message: String },

    /// I/O error (file not found, write failure, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unsupported_backend(message: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            message: message.into(),
        }
    }

    pub fn device_init_failed(message: impl Into<String>) -> Self {
        Self::DeviceInitFailed {
            message: message.into(),
        }
    }

    pub fn container(message: impl Into<String>) -> Self {
        Self::Container {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn unsupported_codec(message: impl Into<String>) -> Self {
        Self::UnsupportedCodec {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /**
        Returns true if this error ends the stream or encoder that raised it.

        Parameter and ordering errors are rejected before any state changes,
        so the caller can correct the call and continue.
    */
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidParameters { .. } | Self::OutOfOrder { .. })
    }
}

/**
    Result type alias for the framereader crates.
*/
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn error_display() {
        let e = Error::decode("bad slice");
        assert_eq!(format!("{e}"), "decode error: bad slice");

        let e = Error::OutOfOrder {
            timestamp: 3,
            last: 5,
        };
        assert_eq!(
            format!("{e}"),
            "frame timestamp 3 is not after the last accepted timestamp 5"
        );

        let e = Error::unsupported_backend("no CUDA driver");
        assert_eq!(format!("{e}"), "unsupported backend: no CUDA driver");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::container("eof in header").is_fatal());
        assert!(!Error::invalid_parameters("crop").is_fatal());
        assert!(
            !Error::OutOfOrder {
                timestamp: 0,
                last: 0
            }
            .is_fatal()
        );
    }
}
