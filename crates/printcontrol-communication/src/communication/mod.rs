//! Link-level communication with the printer controller
//!
//! - [`serial`]: the open serial channel
//! - [`virtual_port`]: in-memory link and controller simulator
//! - [`ack_gate`]: acknowledgment credits
//! - [`reader`]: background response reader

pub mod ack_gate;
pub mod reader;
pub mod serial;
pub mod virtual_port;

pub use ack_gate::AckGate;
pub use reader::ResponseReader;
pub use serial::SerialChannel;
pub use virtual_port::{VirtualController, VirtualControllerConfig, VirtualEnd, VirtualPort};
