//! Data models for connection and job state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of the printer link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link open
    #[default]
    Disconnected,
    /// Link is being opened
    Connecting,
    /// Link open and reader running
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Status of a print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    /// No job started
    #[default]
    Off,
    /// Frames are being streamed
    Running,
    /// Streaming suspended after the in-flight frame
    Paused,
    /// Job finished, stopped or failed
    Ended,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}
