//! Printer driver
//!
//! [`PrinterDriver`] is the handle applications hold. Every request is queued
//! as a message for a dedicated driver thread, which owns the connection
//! session, the loaded document and the print job. The driver thread and the
//! session's response reader are the only two execution contexts per
//! connection; they share the channel and the acknowledgment gate.
//!
//! Printing is cooperative. Each `Step` message transmits at most one frame
//! and posts the next `Step` back to the same mailbox, so pause, stop and
//! manual commands queued in the meantime run between frames.

pub mod job;
pub mod send_path;

pub use job::{PrintJobController, StepOutcome};
pub use send_path::{FrameTransport, SendPath};

use crate::communication::{AckGate, ResponseReader, SerialChannel};
use crate::firmware::marlin::{command_content, Axes, Axis, ImmediateCommand};
use printcontrol_core::{
    thread_safe_none, thread_safe_rw, ConnectionConfig, ConnectionError, ConnectionState,
    DriverEvent, Error, EventDispatcher, GcodeDocument, JobError, JobStatus, Result,
    ThreadSafeOption, ThreadSafeRw,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{broadcast, mpsc};

enum DriverMessage {
    Connect(ConnectionConfig),
    Attach(SerialChannel),
    Disconnect,
    LoadFile(PathBuf),
    LoadText(String),
    Command(ImmediateCommand),
    Run,
    Pause,
    Resume,
    Stop,
    Restart,
    Step,
    ReaderExited(u64),
    Shutdown,
}

/// The channel and gate of the current session, reachable from the handle
#[derive(Debug, Clone)]
struct SessionLink {
    channel: Arc<SerialChannel>,
    gate: Arc<AckGate>,
}

impl SessionLink {
    /// Close the channel and release any sender blocked on the gate
    fn sever(&self) {
        self.channel.close();
        self.gate.reset();
    }
}

#[derive(Debug, Clone)]
struct SharedState {
    link: ThreadSafeOption<SessionLink>,
    connection_state: ThreadSafeRw<ConnectionState>,
    job_status: ThreadSafeRw<JobStatus>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            link: thread_safe_none(),
            connection_state: thread_safe_rw(ConnectionState::Disconnected),
            job_status: thread_safe_rw(JobStatus::Off),
        }
    }
}

/// Handle to a running printer driver
///
/// Requests return as soon as they are queued; outcomes are reported as
/// [`DriverEvent`]s to subscribers.
#[derive(Debug)]
pub struct PrinterDriver {
    tx: mpsc::UnboundedSender<DriverMessage>,
    events: EventDispatcher,
    shared: SharedState,
    handle: Option<JoinHandle<()>>,
}

impl PrinterDriver {
    /// Start a driver with its own event dispatcher
    pub fn new() -> Result<Self> {
        Self::with_events(EventDispatcher::default())
    }

    /// Start a driver that publishes to `events`
    pub fn with_events(events: EventDispatcher) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = SharedState::new();

        let worker = DriverWorker {
            rx,
            tx: tx.clone(),
            events: events.clone(),
            shared: shared.clone(),
            document: GcodeDocument::new(),
            job: PrintJobController::new(),
            session: None,
            next_session_id: 0,
            step_scheduled: false,
        };
        let handle = thread::Builder::new()
            .name("printcontrol-driver".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            tx,
            events,
            shared,
            handle: Some(handle),
        })
    }

    /// Subscribe to driver events
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }

    /// The dispatcher events are published on
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection_state.read()
    }

    /// Current job status
    pub fn job_status(&self) -> JobStatus {
        *self.shared.job_status.read()
    }

    /// Open a serial port; any current connection is closed first
    pub fn connect(&self, config: ConnectionConfig) -> Result<()> {
        self.post(DriverMessage::Connect(config))
    }

    /// Use an already open channel as the connection
    pub fn attach(&self, channel: SerialChannel) -> Result<()> {
        self.post(DriverMessage::Attach(channel))
    }

    /// Close the connection
    ///
    /// The channel is closed and the gate reset right away, so a job waiting
    /// for an acknowledgment that will never come is released.
    pub fn disconnect(&self) -> Result<()> {
        if let Some(link) = self.shared.link.lock().as_ref() {
            link.sever();
        }
        self.post(DriverMessage::Disconnect)
    }

    /// Load a G-Code file, replacing the current document
    pub fn load_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.post(DriverMessage::LoadFile(path.into()))
    }

    /// Load G-Code text, replacing the current document
    pub fn load_text(&self, text: impl Into<String>) -> Result<()> {
        self.post(DriverMessage::LoadText(text.into()))
    }

    /// Send a manual command
    pub fn command(&self, command: ImmediateCommand) -> Result<()> {
        self.post(DriverMessage::Command(command))
    }

    /// Home the given axes; no axes homes all of them
    pub fn home(&self, axes: Axes) -> Result<()> {
        self.command(ImmediateCommand::Home(axes))
    }

    /// Set a fan speed (0-255)
    pub fn set_fan(&self, channel: u8, speed: u8) -> Result<()> {
        self.command(ImmediateCommand::Fan { channel, speed })
    }

    /// Set a hot-end target temperature
    pub fn set_hotend_temperature(&self, channel: u8, celsius: f64) -> Result<()> {
        self.command(ImmediateCommand::HotendTemperature { channel, celsius })
    }

    /// Set the bed target temperature
    pub fn set_bed_temperature(&self, celsius: f64) -> Result<()> {
        self.command(ImmediateCommand::BedTemperature(celsius))
    }

    /// Extrude (positive) or retract (negative) filament
    pub fn extrude(&self, mm: f64) -> Result<()> {
        self.command(ImmediateCommand::Extrude(mm))
    }

    /// Retract filament
    pub fn retract(&self, mm: f64) -> Result<()> {
        self.command(ImmediateCommand::retract(mm))
    }

    /// Move one axis relative to its current position
    pub fn jog(&self, axis: Axis, distance: f64, feed_rate: f64) -> Result<()> {
        self.command(ImmediateCommand::Jog {
            axis,
            distance,
            feed_rate,
        })
    }

    /// Send a raw line unnumbered
    pub fn exec(&self, line: impl Into<String>) -> Result<()> {
        self.command(ImmediateCommand::Raw(line.into()))
    }

    /// Start printing the loaded document
    pub fn run(&self) -> Result<()> {
        self.post(DriverMessage::Run)
    }

    /// Pause after the frame in flight
    pub fn pause(&self) -> Result<()> {
        self.post(DriverMessage::Pause)
    }

    /// Continue a paused job
    pub fn resume(&self) -> Result<()> {
        self.post(DriverMessage::Resume)
    }

    /// End the job
    pub fn stop(&self) -> Result<()> {
        self.post(DriverMessage::Stop)
    }

    /// Start the job again from the first line
    pub fn restart(&self) -> Result<()> {
        self.post(DriverMessage::Restart)
    }

    /// Stop the driver thread and wait for it
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn post(&self, message: DriverMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::other("Printer driver is not running"))
    }

    fn stop_worker(&mut self) {
        if let Some(link) = self.shared.link.lock().as_ref() {
            link.sever();
        }
        let _ = self.tx.send(DriverMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Printer driver thread panicked");
            }
        }
    }
}

impl Drop for PrinterDriver {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

struct Session {
    id: u64,
    link: SessionLink,
    reader: ResponseReader,
}

struct DriverWorker {
    rx: mpsc::UnboundedReceiver<DriverMessage>,
    tx: mpsc::UnboundedSender<DriverMessage>,
    events: EventDispatcher,
    shared: SharedState,
    document: GcodeDocument,
    job: PrintJobController,
    session: Option<Session>,
    next_session_id: u64,
    step_scheduled: bool,
}

impl DriverWorker {
    fn run(mut self) {
        tracing::debug!("Printer driver started");
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                DriverMessage::Shutdown => break,
                DriverMessage::Connect(config) => self.connect(&config),
                DriverMessage::Attach(channel) => self.start_session(channel),
                DriverMessage::Disconnect => self.disconnect(),
                DriverMessage::LoadFile(path) => self.load_file(path),
                DriverMessage::LoadText(text) => self.load_text(&text),
                DriverMessage::Command(command) => self.send_command(&command),
                DriverMessage::Run => self.run_job(),
                DriverMessage::Pause => {
                    self.job.pause();
                    self.sync_job_status();
                }
                DriverMessage::Resume => self.resume_job(),
                DriverMessage::Stop => self.stop_job(),
                DriverMessage::Restart => self.restart_job(),
                DriverMessage::Step => self.step(),
                DriverMessage::ReaderExited(id) => self.reader_exited(id),
            }
        }
        self.end_session();
        tracing::debug!("Printer driver stopped");
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        let changed = {
            let mut current = self.shared.connection_state.write();
            let changed = *current != state;
            *current = state;
            changed
        };
        if changed {
            self.events.publish(DriverEvent::ConnectionStateChanged(state));
        }
    }

    fn sync_job_status(&mut self) {
        let status = self.job.status();
        let changed = {
            let mut current = self.shared.job_status.write();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            self.events.publish(DriverEvent::JobStateChanged(status));
        }
    }

    fn schedule_step(&mut self) {
        if self.step_scheduled {
            return;
        }
        self.step_scheduled = self.tx.send(DriverMessage::Step).is_ok();
    }

    /// Tear down the session whose reader has died
    ///
    /// Exits from readers of earlier sessions are ignored.
    fn reader_exited(&mut self, id: u64) {
        if self.session.as_ref().is_some_and(|session| session.id == id) {
            tracing::warn!("Response reader ended, closing connection");
            self.disconnect();
        }
    }

    /// Open a new port; the current session is only replaced once the open
    /// has succeeded
    fn connect(&mut self, config: &ConnectionConfig) {
        let previous = *self.shared.connection_state.read();
        self.set_connection_state(ConnectionState::Connecting);
        match SerialChannel::open(config) {
            Ok(channel) => self.start_session(channel),
            Err(e) => {
                self.set_connection_state(previous);
                self.events.publish(DriverEvent::ConnectFailed(e.to_string()));
            }
        }
    }

    fn start_session(&mut self, channel: SerialChannel) {
        if self.session.is_some() {
            tracing::info!("Closing current connection before using {}", channel.name());
            self.disconnect();
        }

        let id = self.next_session_id;
        self.next_session_id += 1;
        let link = SessionLink {
            channel: Arc::new(channel),
            gate: Arc::new(AckGate::new()),
        };
        let mailbox = self.tx.clone();
        let reader = match ResponseReader::spawn_with_exit(
            link.channel.clone(),
            link.gate.clone(),
            self.events.clone(),
            move |_| {
                let _ = mailbox.send(DriverMessage::ReaderExited(id));
            },
        ) {
            Ok(reader) => reader,
            Err(e) => {
                link.sever();
                tracing::error!("Failed to start response reader: {}", e);
                self.set_connection_state(ConnectionState::Disconnected);
                self.events.publish(DriverEvent::ConnectFailed(e.to_string()));
                return;
            }
        };

        let name = link.channel.name().to_string();
        *self.shared.link.lock() = Some(link.clone());
        self.session = Some(Session { id, link, reader });

        tracing::info!("Connected to {}", name);
        self.set_connection_state(ConnectionState::Connected);
        self.events.publish(DriverEvent::Connected(name));
    }

    fn disconnect(&mut self) {
        if self.job.is_active() {
            self.stop_job();
        }
        self.end_session();
    }

    fn end_session(&mut self) {
        self.shared.link.lock().take();
        let Some(session) = self.session.take() else {
            return;
        };
        session.link.sever();
        session.reader.join();

        tracing::info!("Disconnected from {}", session.link.channel.name());
        self.set_connection_state(ConnectionState::Disconnected);
        self.events.publish(DriverEvent::Disconnected);
    }

    fn load_file(&mut self, path: PathBuf) {
        if self.refuse_load() {
            return;
        }
        let result = self.document.load_file(&path);
        self.finish_load(result);
    }

    fn load_text(&mut self, text: &str) {
        if self.refuse_load() {
            return;
        }
        self.document.load_text(text);
        self.finish_load(Ok(()));
    }

    fn refuse_load(&self) -> bool {
        if self.job.is_active() {
            tracing::warn!("Refusing to load a document while a job is active");
            self.events
                .publish(DriverEvent::LoadFailed("a print job is active".to_string()));
            return true;
        }
        false
    }

    fn finish_load(&mut self, result: Result<()>) {
        self.job = PrintJobController::new();
        self.sync_job_status();
        match result {
            Ok(()) => self.events.publish(DriverEvent::DocumentLoaded {
                lines: self.document.line_count(),
                height: self.document.height_max(),
                filament: self.document.filament_total(),
                layers: self.document.layer_count(),
            }),
            Err(e) => self.events.publish(DriverEvent::LoadFailed(e.to_string())),
        }
    }

    fn send_command(&mut self, command: &ImmediateCommand) {
        let Some(session) = self.session.as_ref() else {
            tracing::warn!("Cannot send {}: not connected", command);
            self.events
                .publish(DriverEvent::WriteFailed(ConnectionError::NotConnected.to_string()));
            return;
        };

        let mut path = SendPath::new(&session.link.channel, &session.link.gate);
        for line in command.to_gcode() {
            let Some(content) = command_content(&line) else {
                continue;
            };
            if let Err(e) = path.transmit(format!("{}\n", content).as_bytes()) {
                tracing::error!("Failed to send {}: {}", content, e);
                self.events.publish(DriverEvent::WriteFailed(e.to_string()));
                return;
            }
            self.events.publish(DriverEvent::CommandSent(content.to_string()));
        }
    }

    fn can_start(&self) -> std::result::Result<(), Error> {
        if self.session.is_none() {
            return Err(ConnectionError::NotConnected.into());
        }
        if self.document.is_empty() {
            return Err(JobError::NoDocument.into());
        }
        Ok(())
    }

    fn run_job(&mut self) {
        if let Err(e) = self.can_start() {
            tracing::warn!("Cannot start print job: {}", e);
            self.events.publish(DriverEvent::JobFailed(e.to_string()));
            return;
        }
        if let Err(e) = self.job.run() {
            tracing::warn!("{}", e);
            return;
        }
        self.job_started();
    }

    fn restart_job(&mut self) {
        if let Err(e) = self.can_start() {
            tracing::warn!("Cannot restart print job: {}", e);
            self.events.publish(DriverEvent::JobFailed(e.to_string()));
            return;
        }
        self.job.restart();
        self.job_started();
    }

    fn job_started(&mut self) {
        self.sync_job_status();
        self.publish_progress();
        self.schedule_step();
    }

    fn resume_job(&mut self) {
        if let Err(e) = self.job.resume() {
            tracing::warn!("{}", e);
            return;
        }
        self.sync_job_status();
        self.schedule_step();
    }

    fn stop_job(&mut self) {
        if self.job.status() == JobStatus::Ended {
            return;
        }
        self.job.stop();
        self.sync_job_status();
        self.events.publish(DriverEvent::JobEnded);
    }

    fn publish_progress(&self) {
        self.events.publish(DriverEvent::JobProgress {
            current: self.job.read_index(),
            total: self.document.line_count(),
        });
    }

    fn step(&mut self) {
        self.step_scheduled = false;
        if self.job.status() != JobStatus::Running {
            return;
        }

        let outcome = match self.session.as_ref() {
            Some(session) => {
                let mut path = SendPath::new(&session.link.channel, &session.link.gate);
                self.job.step(&self.document, &mut path)
            }
            None => {
                self.job.stop();
                StepOutcome::Failed(ConnectionError::NotConnected.into())
            }
        };

        match outcome {
            StepOutcome::Sent { .. } => {
                self.publish_progress();
                self.schedule_step();
            }
            StepOutcome::Skipped => self.schedule_step(),
            StepOutcome::Idle => {}
            StepOutcome::Finished => {
                self.publish_progress();
                self.sync_job_status();
                self.events.publish(DriverEvent::JobEnded);
            }
            StepOutcome::Failed(e) => {
                self.sync_job_status();
                self.events.publish(DriverEvent::JobFailed(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_link_sever_closes_and_resets() {
        let (host, _device) = crate::communication::VirtualPort::pair();
        let link = SessionLink {
            channel: Arc::new(SerialChannel::from_link("virtual", host.reader, host.writer)),
            gate: Arc::new(AckGate::new()),
        };
        link.gate.push();
        link.sever();
        assert!(!link.channel.is_open());
        assert_eq!(link.gate.count(), 0);
    }

    #[test]
    fn test_new_driver_is_idle() {
        let driver = PrinterDriver::new().unwrap();
        assert_eq!(driver.connection_state(), ConnectionState::Disconnected);
        assert_eq!(driver.job_status(), JobStatus::Off);
        driver.shutdown();
    }
}
