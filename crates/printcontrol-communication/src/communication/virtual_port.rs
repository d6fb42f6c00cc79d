//! In-memory serial link and controller simulator
//!
//! [`VirtualPort::pair`] creates two connected endpoints: bytes written on one
//! end are read on the other. Reads wait a bounded time and then report
//! `TimedOut`, like a real port configured with a timeout. Dropping either
//! half closes that direction.
//!
//! [`VirtualController`] sits on the device end and answers every received
//! line with `ok`, optionally holding acknowledgments back until released.
//! It backs dry runs and the protocol tests.

use crate::firmware::marlin::frame;
use parking_lot::{Condvar, Mutex};
use printcontrol_core::{thread_safe, Result, ThreadSafe};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a read waits for data before timing out
pub const VIRTUAL_READ_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct PipeState {
    data: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

impl Pipe {
    fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Receiving half of a virtual link
#[derive(Debug)]
pub struct PipeReader {
    pipe: Arc<Pipe>,
    timeout: Duration,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.timeout;
        let mut state = self.pipe.state.lock();
        while state.data.is_empty() {
            if state.closed {
                return Ok(0);
            }
            if self.pipe.ready.wait_until(&mut state, deadline).timed_out()
                && state.data.is_empty()
            {
                if state.closed {
                    return Ok(0);
                }
                return Err(io::Error::new(io::ErrorKind::TimedOut, "virtual port read timed out"));
            }
        }
        let n = buf.len().min(state.data.len());
        for (slot, byte) in buf.iter_mut().zip(state.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.pipe.close();
    }
}

/// Sending half of a virtual link
#[derive(Debug)]
pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.pipe.state.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "virtual port closed"));
        }
        state.data.extend(buf);
        self.pipe.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.pipe.close();
    }
}

/// One end of a virtual link
#[derive(Debug)]
pub struct VirtualEnd {
    /// Bytes arriving at this end
    pub reader: PipeReader,
    /// Bytes leaving this end
    pub writer: PipeWriter,
}

/// Factory for connected virtual endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualPort;

impl VirtualPort {
    /// Create a connected (host, device) pair
    pub fn pair() -> (VirtualEnd, VirtualEnd) {
        Self::pair_with_timeout(VIRTUAL_READ_TIMEOUT)
    }

    /// Create a connected pair whose reads time out after `timeout`
    pub fn pair_with_timeout(timeout: Duration) -> (VirtualEnd, VirtualEnd) {
        let to_device = Arc::new(Pipe::default());
        let to_host = Arc::new(Pipe::default());
        let host = VirtualEnd {
            reader: PipeReader {
                pipe: to_host.clone(),
                timeout,
            },
            writer: PipeWriter {
                pipe: to_device.clone(),
            },
        };
        let device = VirtualEnd {
            reader: PipeReader {
                pipe: to_device,
                timeout,
            },
            writer: PipeWriter { pipe: to_host },
        };
        (host, device)
    }
}

/// A line received by the simulated controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedLine {
    /// Line text without terminator
    pub text: String,
    /// Whether the line is a numbered frame
    pub framed: bool,
    /// Whether a numbered frame carried a correct checksum
    pub checksum_ok: bool,
}

/// Behaviour of the simulated controller
#[derive(Debug, Clone)]
pub struct VirtualControllerConfig {
    /// Answer each line with `ok` as soon as it arrives
    pub auto_ack: bool,
    /// Lines sent to the host when the simulator starts
    pub greeting: Vec<String>,
}

impl Default for VirtualControllerConfig {
    fn default() -> Self {
        Self {
            auto_ack: true,
            greeting: vec!["start".to_string(), "echo:virtual printer ready".to_string()],
        }
    }
}

/// Simulated printer controller on the device end of a virtual link
#[derive(Debug)]
pub struct VirtualController {
    writer: ThreadSafe<PipeWriter>,
    received: ThreadSafe<Vec<ReceivedLine>>,
    arrived: Arc<Condvar>,
    handle: Option<JoinHandle<()>>,
}

impl VirtualController {
    /// Start a simulator that acknowledges every line
    pub fn spawn(device: VirtualEnd) -> Result<Self> {
        Self::spawn_with(device, VirtualControllerConfig::default())
    }

    /// Start a simulator with the given behaviour
    pub fn spawn_with(device: VirtualEnd, config: VirtualControllerConfig) -> Result<Self> {
        let VirtualEnd { reader, writer } = device;
        let writer = thread_safe(writer);
        let received = thread_safe(Vec::new());
        let arrived = Arc::new(Condvar::new());

        for line in &config.greeting {
            writer.lock().write_all(format!("{}\n", line).as_bytes())?;
        }

        let handle = {
            let writer = writer.clone();
            let received = received.clone();
            let arrived = arrived.clone();
            thread::Builder::new()
                .name("printcontrol-virtual".to_string())
                .spawn(move || {
                    device_loop(reader, &writer, &received, &arrived, config.auto_ack)
                })?
        };

        Ok(Self {
            writer,
            received,
            arrived,
            handle: Some(handle),
        })
    }

    /// Send one `ok` to the host
    pub fn acknowledge(&self) -> Result<()> {
        self.send_line("ok")
    }

    /// Send an arbitrary response line to the host
    pub fn send_line(&self, line: &str) -> Result<()> {
        self.writer.lock().write_all(format!("{}\n", line).as_bytes())?;
        Ok(())
    }

    /// Every line received so far
    pub fn received(&self) -> Vec<ReceivedLine> {
        self.received.lock().clone()
    }

    /// Text of every line received so far
    pub fn received_text(&self) -> Vec<String> {
        self.received.lock().iter().map(|l| l.text.clone()).collect()
    }

    /// Wait until at least `count` lines have arrived
    ///
    /// Returns `false` if `timeout` passed first.
    pub fn wait_for_lines(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut received = self.received.lock();
        while received.len() < count {
            if self.arrived.wait_until(&mut received, deadline).timed_out() {
                return received.len() >= count;
            }
        }
        true
    }

    /// Wait for the host to close the link
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Virtual controller thread panicked");
            }
        }
    }
}

fn device_loop(
    mut reader: PipeReader,
    writer: &ThreadSafe<PipeWriter>,
    received: &ThreadSafe<Vec<ReceivedLine>>,
    arrived: &Condvar,
    auto_ack: bool,
) {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => {
                let text = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                let framed = text.starts_with('N');
                let checksum_ok = framed && frame::verify(text.as_bytes());
                if framed && !checksum_ok {
                    tracing::warn!("Virtual controller received bad frame: {}", text);
                }
                tracing::debug!("virtual >> {}", text);

                received.lock().push(ReceivedLine {
                    text,
                    framed,
                    checksum_ok,
                });
                arrived.notify_all();

                if auto_ack && writer.lock().write_all(b"ok\n").is_err() {
                    break;
                }
            }
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(_) => break,
        }
    }
    tracing::debug!("Virtual controller stopped");
}
