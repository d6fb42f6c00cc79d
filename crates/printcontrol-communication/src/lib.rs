//! # PrintControl Communication
//!
//! Serial link and firmware protocol for PrintControl.
//! Streams G-Code to Marlin-style controllers as numbered, checksummed
//! frames, one acknowledgment at a time, while a background reader parses
//! the controller's replies.

pub mod communication;
pub mod driver;
pub mod firmware;

pub use communication::{
    AckGate, ResponseReader, SerialChannel, VirtualController, VirtualControllerConfig,
    VirtualEnd, VirtualPort,
};

pub use driver::{FrameTransport, PrintJobController, PrinterDriver, SendPath, StepOutcome};

pub use firmware::marlin::{Axes, Axis, ImmediateCommand, ResponseEvent, ResponseParser};
