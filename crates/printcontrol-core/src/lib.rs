//! # PrintControl Core
//!
//! Core types and utilities for PrintControl.
//! Provides the G-Code document model, connection configuration,
//! driver events and the error types shared by every crate.

pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod gcode;
pub mod types;

pub use config::{
    ConnectionConfig, DataBits, FlowControl, Parity, StopBits, STANDARD_BAUD_RATES,
};

pub use self::core::{DriverEvent, EventDispatcher};

pub use data::{ConnectionState, JobStatus};

pub use error::{ConnectionError, Error, GcodeError, JobError, ProtocolError, Result};

pub use gcode::GcodeDocument;

// Re-export type aliases for convenience
pub use types::{thread_safe, thread_safe_none, thread_safe_rw, ThreadSafe, ThreadSafeOption, ThreadSafeRw};
