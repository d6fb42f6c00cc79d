//! Serial port communication implementation
//!
//! Provides the byte-level channel to the printer controller over USB or
//! RS-232. The channel owns two independent handles to the same port: the
//! write half is used only by the driver thread, the read half only by the
//! response reader, so the two directions never contend for a lock.
//!
//! Supports:
//! - Baud rate, parity, stop bit, data bit and flow control configuration
//! - Single-byte reads with a bounded timeout
//! - Short-write detection

use parking_lot::Mutex;
use printcontrol_core::{
    ConnectionConfig, ConnectionError, DataBits, FlowControl, Parity, Result, StopBits,
};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Read timeout used for opened ports
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

type ReadHalf = Box<dyn Read + Send>;
type WriteHalf = Box<dyn Write + Send>;

/// Convert a parity setting to serialport format
fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

/// Convert a stop bit setting to serialport format
fn to_serialport_stop_bits(stop_bits: StopBits) -> serialport::StopBits {
    match stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

/// Convert a data bit setting to serialport format
fn to_serialport_data_bits(data_bits: DataBits) -> serialport::DataBits {
    match data_bits {
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

/// Convert a flow control setting to serialport format
///
/// The OS layer has no combined mode, so `Both` falls back to hardware
/// flow control.
fn to_serialport_flow_control(flow_control: FlowControl) -> serialport::FlowControl {
    match flow_control {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
        FlowControl::Both => {
            tracing::warn!("Combined flow control not supported, using hardware flow control");
            serialport::FlowControl::Hardware
        }
    }
}

/// An open link to the controller
pub struct SerialChannel {
    name: String,
    reader: Mutex<Option<ReadHalf>>,
    writer: Mutex<Option<WriteHalf>>,
    open: AtomicBool,
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl SerialChannel {
    /// Open a serial port with the given configuration
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let failed = |e: serialport::Error| {
            tracing::warn!("Failed to open serial port {}: {}", config.device_path, e);
            ConnectionError::FailedToOpen {
                port: config.device_path.clone(),
                reason: e.to_string(),
            }
        };

        let port = serialport::new(&config.device_path, config.baud_rate)
            .timeout(DEFAULT_READ_TIMEOUT)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(config.parity))
            .flow_control(to_serialport_flow_control(config.flow_control))
            .open()
            .map_err(failed)?;
        let reader = port.try_clone().map_err(failed)?;

        tracing::info!(
            "Opened {} at {} baud ({} parity, {} stop, {} data, {} flow)",
            config.device_path,
            config.baud_rate,
            config.parity,
            config.stop_bits,
            config.data_bits,
            config.flow_control
        );

        Ok(Self::from_link(config.device_path.clone(), reader, port))
    }

    /// Build a channel from an arbitrary read/write pair
    pub fn from_link(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Mutex::new(Some(Box::new(writer))),
            open: AtomicBool::new(true),
        }
    }

    /// Name of the underlying device
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the channel is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close both halves of the channel
    ///
    /// A read in progress finishes at its timeout; later reads and writes
    /// fail with [`ConnectionError::Closed`].
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::info!("Closing {}", self.name);
        }
        self.writer.lock().take();
        self.reader.lock().take();
    }

    /// Write all of `data` in one call
    ///
    /// A write that accepts fewer bytes than requested is reported as
    /// [`ConnectionError::ShortWrite`].
    pub fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(ConnectionError::Closed.into());
        }
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;

        let written = writer.write(data).map_err(io_error)?;
        if written < data.len() || written == 0 {
            return Err(ConnectionError::ShortWrite {
                written,
                expected: data.len(),
            }
            .into());
        }
        writer.flush().map_err(io_error)?;
        Ok(written)
    }

    /// Read a single byte
    ///
    /// Returns `Ok(None)` when the read timed out without data.
    pub fn read_byte(&self) -> Result<Option<u8>> {
        if !self.is_open() {
            return Err(ConnectionError::Closed.into());
        }
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(ConnectionError::Closed)?;

        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Err(ConnectionError::Closed.into()),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(io_error(e).into()),
        }
    }
}

fn io_error(e: io::Error) -> ConnectionError {
    ConnectionError::IoError {
        reason: e.to_string(),
    }
}
