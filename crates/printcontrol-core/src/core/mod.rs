//! Core event plumbing shared by the driver and its consumers.

pub mod event;

pub use event::{DriverEvent, EventDispatcher};
