//! Firmware protocol implementations
//!
//! Supported controllers:
//! - Marlin and other RepRap firmwares speaking the numbered/checksummed host protocol

pub mod marlin;

pub use marlin::{ImmediateCommand, ResponseEvent, ResponseParser};
