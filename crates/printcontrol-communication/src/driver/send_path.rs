//! The single send path to the controller
//!
//! Job frames and manual commands both leave through [`FrameTransport`], which
//! writes one line and then waits for its acknowledgment. Only one line is
//! ever unacknowledged.

use crate::communication::{AckGate, SerialChannel};
use printcontrol_core::{ProtocolError, Result};
use std::time::Duration;

/// How often a sender waiting for an acknowledgment checks the link
pub const LINK_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Something that can deliver one line and wait for it to be accepted
pub trait FrameTransport {
    /// Write `bytes` and block until the controller acknowledges them
    fn transmit(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Transport over an open channel and its acknowledgment gate
#[derive(Debug)]
pub struct SendPath<'a> {
    channel: &'a SerialChannel,
    gate: &'a AckGate,
}

impl<'a> SendPath<'a> {
    /// Create a send path
    pub fn new(channel: &'a SerialChannel, gate: &'a AckGate) -> Self {
        Self { channel, gate }
    }
}

impl FrameTransport for SendPath<'_> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        tracing::debug!(">> {}", String::from_utf8_lossy(bytes).trim_end());
        self.channel.write_bytes(bytes)?;

        // A reset that lands before the wait starts is not seen by the gate,
        // so a closed channel also ends the wait.
        while !self.gate.pop_timeout(LINK_CHECK_INTERVAL)? {
            if !self.channel.is_open() {
                return Err(ProtocolError::AckAborted.into());
            }
        }
        Ok(())
    }
}
