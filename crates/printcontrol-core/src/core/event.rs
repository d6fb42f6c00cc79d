//! Event system for driver notifications
//!
//! Provides:
//! - Event types for connection, job and controller output changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{ConnectionState, JobStatus};
use tokio::sync::broadcast;

/// Driver event types
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Connection state changed
    ConnectionStateChanged(ConnectionState),
    /// Link opened on the named device
    Connected(String),
    /// Link closed
    Disconnected,
    /// Opening the link failed; state is unchanged
    ConnectFailed(String),
    /// Diagnostic text echoed by the controller
    Echo(String),
    /// A G-Code document was loaded
    DocumentLoaded {
        /// Number of raw lines.
        lines: usize,
        /// Highest Z reached.
        height: f64,
        /// Summed extrusion.
        filament: f64,
        /// Number of layers.
        layers: usize,
    },
    /// Loading a document failed
    LoadFailed(String),
    /// Job state changed
    JobStateChanged(JobStatus),
    /// Job progress in source lines
    JobProgress {
        /// Lines consumed so far.
        current: usize,
        /// Lines in the document.
        total: usize,
    },
    /// Job reached the end of the document or was stopped
    JobEnded,
    /// Job aborted by a transmission failure
    JobFailed(String),
    /// A manual command line was acknowledged
    CommandSent(String),
    /// A manual command could not be written
    WriteFailed(String),
    /// The response reader terminated
    ReaderStopped(String),
}

impl std::fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverEvent::ConnectionStateChanged(state) => write!(f, "Connection: {}", state),
            DriverEvent::Connected(device) => write!(f, "Connected to {}", device),
            DriverEvent::Disconnected => write!(f, "Disconnected"),
            DriverEvent::ConnectFailed(reason) => write!(f, "Connect failed: {}", reason),
            DriverEvent::Echo(text) => write!(f, "echo: {}", text),
            DriverEvent::DocumentLoaded {
                lines,
                height,
                filament,
                layers,
            } => write!(
                f,
                "Loaded {} lines (height {:.2} mm, filament {:.2} mm, {} layers)",
                lines, height, filament, layers
            ),
            DriverEvent::LoadFailed(reason) => write!(f, "Load failed: {}", reason),
            DriverEvent::JobStateChanged(status) => write!(f, "Job: {}", status),
            DriverEvent::JobProgress { current, total } => {
                write!(f, "Progress: {}/{}", current, total)
            }
            DriverEvent::JobEnded => write!(f, "Job ended"),
            DriverEvent::JobFailed(reason) => write!(f, "Job failed: {}", reason),
            DriverEvent::CommandSent(line) => write!(f, "Sent: {}", line),
            DriverEvent::WriteFailed(reason) => write!(f, "Write failed: {}", reason),
            DriverEvent::ReaderStopped(reason) => write!(f, "Reader stopped: {}", reason),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone, Debug)]
pub struct EventDispatcher {
    /// Broadcast sender channel for driver events.
    tx: broadcast::Sender<DriverEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: DriverEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for driver event");
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
