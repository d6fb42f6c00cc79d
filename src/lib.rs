//! # PrintControl
//!
//! Streams G-Code programs to 3D printer controllers over a serial link.
//!
//! ## Architecture
//!
//! PrintControl is organized as a workspace with multiple crates:
//!
//! 1. **printcontrol-core** - Errors, events, connection configuration, G-Code document model
//! 2. **printcontrol-communication** - Serial channel, framing, response reader, print driver
//! 3. **printcontrol** - Command-line sender that integrates both crates
//!
//! ## Protocol
//!
//! Program lines go out as `N<seq> <command>*<checksum>` frames. The controller
//! answers each accepted line with `ok`; exactly one line is ever waiting for
//! its answer. `echo:` lines from the controller are passed through as
//! diagnostics.

pub mod cli;

pub use printcontrol_communication::firmware;

pub use printcontrol_core::{
    ConnectionConfig, ConnectionError, ConnectionState, DataBits, DriverEvent, Error,
    EventDispatcher, FlowControl, GcodeDocument, GcodeError, JobError, JobStatus, Parity,
    ProtocolError, Result, StopBits, STANDARD_BAUD_RATES,
};

pub use printcontrol_communication::{
    AckGate, Axes, Axis, ImmediateCommand, PrintJobController, PrinterDriver, SerialChannel,
    VirtualController, VirtualControllerConfig, VirtualPort,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty formatted output on stderr, leaving stdout to the sender
/// - RUST_LOG environment variable support, `info` when unset
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
