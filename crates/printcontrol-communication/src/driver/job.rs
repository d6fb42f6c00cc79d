//! Print job state machine
//!
//! Streams a loaded document one line per [`PrintJobController::step`]. Each
//! step either skips a blank/comment line or sends one frame and waits for
//! its acknowledgment, then returns so the caller can schedule the next step.
//! Pause and stop take effect between steps; they never cut a frame short.
//!
//! ```text
//!   Off --run--> Running --pause--> Paused --resume--> Running
//!                   |                  |
//!                   +------stop--------+----> Ended --restart--> Running
//! ```

use crate::driver::send_path::FrameTransport;
use crate::firmware::marlin::frame;
use printcontrol_core::{Error, GcodeDocument, JobError, JobStatus};

/// What a call to [`PrintJobController::step`] did
#[derive(Debug)]
pub enum StepOutcome {
    /// A frame was sent and acknowledged
    Sent {
        /// Sequence number of the frame
        seq: u32,
    },
    /// A line with nothing to send was skipped
    Skipped,
    /// The job is not running; no further steps should be scheduled
    Idle,
    /// The last line was consumed; the job is now Ended
    Finished,
    /// Transmission failed; the job is now Ended
    Failed(Error),
}

impl StepOutcome {
    /// Whether another step should be scheduled
    pub fn wants_next_step(&self) -> bool {
        matches!(self, StepOutcome::Sent { .. } | StepOutcome::Skipped)
    }
}

/// Line-by-line print job driver
#[derive(Debug, Default)]
pub struct PrintJobController {
    status: JobStatus,
    read_index: usize,
    sent_seq: u32,
}

impl PrintJobController {
    /// Create a controller in the Off state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Index of the next source line to consider
    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// Sequence number of the last frame sent
    pub fn sent_seq(&self) -> u32 {
        self.sent_seq
    }

    /// Whether the job is Running or Paused
    pub fn is_active(&self) -> bool {
        matches!(self.status, JobStatus::Running | JobStatus::Paused)
    }

    /// Start from the first line; only valid from Off
    pub fn run(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Off {
            return Err(self.invalid(JobStatus::Running));
        }
        self.begin();
        tracing::info!("Print job started");
        Ok(())
    }

    /// Process one source line
    pub fn step(
        &mut self,
        document: &GcodeDocument,
        transport: &mut impl FrameTransport,
    ) -> StepOutcome {
        if self.status != JobStatus::Running {
            return StepOutcome::Idle;
        }

        let Some(line) = document.line(self.read_index) else {
            self.status = JobStatus::Ended;
            tracing::info!("Print job finished after {} frames", self.sent_seq);
            return StepOutcome::Finished;
        };

        let seq = self.sent_seq + 1;
        let Some(bytes) = frame::encode(seq, line) else {
            self.read_index += 1;
            return StepOutcome::Skipped;
        };

        if let Err(e) = transport.transmit(&bytes) {
            self.status = JobStatus::Ended;
            tracing::error!("Print job aborted at line {}: {}", self.read_index + 1, e);
            return StepOutcome::Failed(e);
        }

        self.sent_seq = seq;
        self.read_index += 1;
        StepOutcome::Sent { seq }
    }

    /// Suspend after the in-flight frame; returns whether the state changed
    pub fn pause(&mut self) -> bool {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Paused;
            tracing::info!("Print job paused at line {}", self.read_index);
            true
        } else {
            false
        }
    }

    /// Continue a paused job from where it stopped
    pub fn resume(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Paused {
            return Err(self.invalid(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        tracing::info!("Print job resumed at line {}", self.read_index);
        Ok(())
    }

    /// End the job unconditionally
    pub fn stop(&mut self) {
        if self.status != JobStatus::Ended {
            tracing::info!("Print job stopped at line {}", self.read_index);
        }
        self.status = JobStatus::Ended;
    }

    /// Start again from the first line, whatever the current state
    pub fn restart(&mut self) {
        self.begin();
        tracing::info!("Print job restarted");
    }

    fn begin(&mut self) {
        self.read_index = 0;
        self.sent_seq = 0;
        self.status = JobStatus::Running;
    }

    fn invalid(&self, requested: JobStatus) -> JobError {
        JobError::InvalidTransition {
            current: self.status.to_string(),
            requested: requested.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printcontrol_core::ConnectionError;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<String>,
        fail_on: Option<usize>,
    }

    impl FrameTransport for RecordingTransport {
        fn transmit(&mut self, bytes: &[u8]) -> printcontrol_core::Result<()> {
            if self.fail_on == Some(self.sent.len()) {
                return Err(ConnectionError::ShortWrite {
                    written: 0,
                    expected: bytes.len(),
                }
                .into());
            }
            self.sent.push(String::from_utf8(bytes.to_vec()).unwrap());
            Ok(())
        }
    }

    fn run_to_end(job: &mut PrintJobController, doc: &GcodeDocument, t: &mut RecordingTransport) {
        while job.step(doc, t).wants_next_step() {}
    }

    #[test]
    fn test_skips_comment_without_using_sequence_number() {
        let doc = GcodeDocument::from_text("G1 Z1\n; comment only\nG1 X5 E2");
        let mut job = PrintJobController::new();
        let mut transport = RecordingTransport::default();

        job.run().unwrap();
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Sent { seq: 1 }));
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Skipped));
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Sent { seq: 2 }));
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Finished));
        assert_eq!(job.status(), JobStatus::Ended);

        assert_eq!(transport.sent.len(), 2);
        assert!(transport.sent[0].starts_with("N1 G1 Z1*"));
        assert!(transport.sent[1].starts_with("N2 G1 X5 E2*"));
        assert!(transport.sent.iter().all(|f| frame::verify(f.as_bytes())));
    }

    #[test]
    fn test_run_only_from_off() {
        let mut job = PrintJobController::new();
        job.run().unwrap();
        assert!(job.run().is_err());
        job.stop();
        assert!(job.run().is_err());
    }

    #[test]
    fn test_pause_stops_stepping_and_resume_continues() {
        let doc = GcodeDocument::from_text("G28\nG1 X1\nG1 X2");
        let mut job = PrintJobController::new();
        let mut transport = RecordingTransport::default();

        job.run().unwrap();
        job.step(&doc, &mut transport);
        assert!(job.pause());
        assert!(!job.pause());
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Idle));
        assert_eq!(transport.sent.len(), 1);

        job.resume().unwrap();
        run_to_end(&mut job, &doc, &mut transport);
        assert_eq!(transport.sent.len(), 3);
        assert!(transport.sent[2].starts_with("N3 G1 X2*"));
    }

    #[test]
    fn test_restart_begins_at_first_line() {
        let doc = GcodeDocument::from_text("G28\nG1 X1\nG1 X2");
        let mut job = PrintJobController::new();
        let mut transport = RecordingTransport::default();

        job.run().unwrap();
        job.step(&doc, &mut transport);
        job.step(&doc, &mut transport);
        job.restart();
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.read_index(), 0);
        assert_eq!(job.sent_seq(), 0);

        job.step(&doc, &mut transport);
        assert!(transport.sent[2].starts_with("N1 G28*"));
    }

    #[test]
    fn test_restart_from_ended_and_off() {
        let doc = GcodeDocument::from_text("G28");
        let mut transport = RecordingTransport::default();

        let mut job = PrintJobController::new();
        job.restart();
        assert_eq!(job.status(), JobStatus::Running);

        job.step(&doc, &mut transport);
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Finished));
        assert_eq!(job.status(), JobStatus::Ended);

        job.restart();
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.read_index(), 0);
        assert_eq!(job.sent_seq(), 0);
        assert!(matches!(
            job.step(&doc, &mut transport),
            StepOutcome::Sent { seq: 1 }
        ));
    }

    #[test]
    fn test_transmit_failure_ends_job() {
        let doc = GcodeDocument::from_text("G28\nG1 X1\nG1 X2");
        let mut job = PrintJobController::new();
        let mut transport = RecordingTransport {
            fail_on: Some(1),
            ..Default::default()
        };

        job.run().unwrap();
        assert!(matches!(job.step(&doc, &mut transport), StepOutcome::Sent { seq: 1 }));
        let outcome = job.step(&doc, &mut transport);
        assert!(matches!(outcome, StepOutcome::Failed(_)));
        assert!(!outcome.wants_next_step());
        assert_eq!(job.status(), JobStatus::Ended);
        assert_eq!(job.sent_seq(), 1);
        assert_eq!(job.read_index(), 1);
    }

    #[test]
    fn test_stop_is_unconditional() {
        let mut job = PrintJobController::new();
        job.stop();
        assert_eq!(job.status(), JobStatus::Ended);
        job.restart();
        job.pause();
        job.stop();
        assert_eq!(job.status(), JobStatus::Ended);
        assert!(job.resume().is_err());
    }
}
