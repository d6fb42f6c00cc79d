//! Background response reader
//!
//! One reader thread runs per open connection. It pulls bytes from the
//! channel one at a time, reassembles lines, and hands each complete line to
//! the [`ResponseParser`]. Acknowledgments become credits on the session's
//! [`AckGate`]; echo text is forwarded to the event sink unchanged.
//!
//! The loop ends for good on the first read error or when the channel is
//! closed. On the way out it closes the channel and resets the gate, so a
//! sender waiting for an acknowledgment is released. A new connection needs a
//! new reader.

use crate::communication::ack_gate::AckGate;
use crate::communication::serial::SerialChannel;
use crate::firmware::marlin::ResponseParser;
use printcontrol_core::{DriverEvent, EventDispatcher, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Longest response line kept; longer lines are discarded
pub const MAX_LINE_LENGTH: usize = 4096;

/// Handle to a running reader thread
#[derive(Debug)]
pub struct ResponseReader {
    handle: Option<JoinHandle<()>>,
}

impl ResponseReader {
    /// Start reading from `channel`
    pub fn spawn(
        channel: Arc<SerialChannel>,
        gate: Arc<AckGate>,
        events: EventDispatcher,
    ) -> Result<Self> {
        Self::spawn_with_exit(channel, gate, events, |_| {})
    }

    /// Start reading from `channel`, calling `on_exit` with the reason once
    /// the loop has ended
    pub fn spawn_with_exit(
        channel: Arc<SerialChannel>,
        gate: Arc<AckGate>,
        events: EventDispatcher,
        on_exit: impl FnOnce(String) + Send + 'static,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("printcontrol-reader".to_string())
            .spawn(move || on_exit(read_loop(&channel, &gate, &events)))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Whether the reader loop has ended
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the reader loop to end
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Response reader thread panicked");
            }
        }
    }
}

fn read_loop(channel: &SerialChannel, gate: &AckGate, events: &EventDispatcher) -> String {
    let parser = ResponseParser::new();
    let mut line: Vec<u8> = Vec::with_capacity(128);
    let mut overflowed = false;

    tracing::debug!("Response reader started on {}", channel.name());

    let reason = loop {
        match channel.read_byte() {
            Ok(Some(b'\n')) => {
                if overflowed {
                    overflowed = false;
                } else {
                    handle_line(&parser, &String::from_utf8_lossy(&line), gate, events);
                }
                line.clear();
            }
            Ok(Some(byte)) => {
                if line.len() < MAX_LINE_LENGTH {
                    line.push(byte);
                } else if !overflowed {
                    tracing::warn!("Discarding response line over {} bytes", MAX_LINE_LENGTH);
                    overflowed = true;
                }
            }
            Ok(None) => {}
            Err(e) => break e.to_string(),
        }
    };

    // Nobody will acknowledge lines on this channel any more.
    channel.close();
    gate.reset();
    tracing::info!("Response reader on {} stopped: {}", channel.name(), reason);
    events.publish(DriverEvent::ReaderStopped(reason.clone()));
    reason
}

fn handle_line(parser: &ResponseParser, line: &str, gate: &AckGate, events: &EventDispatcher) {
    tracing::debug!("<< {}", line.trim_end());
    let event = parser.parse(line);

    for (key, value) in &event.fields {
        tracing::trace!("response field {}={}", key, value);
    }
    if event.ack {
        gate.push();
    }
    if let Some(text) = event.echo_text {
        events.publish(DriverEvent::Echo(text));
    }
}
