//! Error handling for PrintControl
//!
//! Provides error types for all layers of the sender:
//! - G-Code errors (document loading)
//! - Connection errors (serial link)
//! - Protocol errors (acknowledgment flow control)
//! - Job errors (print job state machine)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// G-Code error type
///
/// Represents errors related to loading a G-Code document.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// File could not be opened or read
    #[error("File error: {reason}")]
    FileError {
        /// The reason for the file error.
        reason: String,
    },
}

/// Connection error type
///
/// Represents errors related to the serial link to the controller.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// The channel was closed while in use
    #[error("Channel closed")]
    Closed,

    /// The link accepted fewer bytes than were written
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually accepted by the link.
        written: usize,
        /// Bytes that should have been written.
        expected: usize,
    },

    /// I/O error on the link
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents failures of the acknowledgment-gated flow control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A wait for an acknowledgment was released by a reset of the gate
    #[error("Acknowledgment wait aborted")]
    AckAborted,
}

/// Print job error type
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// The requested transition is not allowed from the current state
    #[error("Invalid job transition from {current} to {requested}")]
    InvalidTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },

    /// No document has been loaded
    #[error("No document loaded")]
    NoDocument,
}

/// Main error type for PrintControl
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectionError::FailedToOpen {
            port: "/dev/ttyUSB0".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open port /dev/ttyUSB0: busy");

        let err = ConnectionError::ShortWrite {
            written: 0,
            expected: 12,
        };
        assert_eq!(err.to_string(), "Short write: 0 of 12 bytes");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ProtocolError::AckAborted.into();
        assert!(err.is_protocol_error());
        assert!(!err.is_connection_error());

        let err: Error = ConnectionError::Closed.into();
        assert!(err.is_connection_error());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
