//! Acknowledgment-gated flow control
//!
//! The controller answers every accepted line with `ok`. The response reader
//! turns each `ok` into one credit with [`AckGate::push`]; the sender takes one
//! credit with [`AckGate::pop`] after each line it writes, blocking until the
//! controller has caught up. This keeps exactly one unacknowledged line in
//! flight.

use parking_lot::{Condvar, Mutex};
use printcontrol_core::ProtocolError;
use std::time::Duration;

#[derive(Debug, Default)]
struct GateState {
    credits: u64,
    /// Bumped by every reset so waiters can tell their wait was cancelled.
    generation: u64,
}

/// Counting semaphore for controller acknowledgments
#[derive(Debug, Default)]
pub struct AckGate {
    state: Mutex<GateState>,
    available: Condvar,
}

impl AckGate {
    /// Create a gate with no credits
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one credit and wake a waiter
    pub fn push(&self) {
        let mut state = self.state.lock();
        state.credits += 1;
        tracing::trace!("ack credit pushed ({} available)", state.credits);
        self.available.notify_one();
    }

    /// Take one credit, blocking until one is available
    ///
    /// Returns [`ProtocolError::AckAborted`] without taking a credit if the
    /// gate is reset while waiting.
    pub fn pop(&self) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        let generation = state.generation;
        while state.credits == 0 {
            self.available.wait(&mut state);
            if state.generation != generation {
                return Err(ProtocolError::AckAborted);
            }
        }
        state.credits -= 1;
        Ok(())
    }

    /// Take one credit, waiting at most `timeout`
    ///
    /// Returns `Ok(false)` if no credit arrived in time.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<bool, ProtocolError> {
        let mut state = self.state.lock();
        let generation = state.generation;
        while state.credits == 0 {
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return Ok(false);
            }
            if state.generation != generation {
                return Err(ProtocolError::AckAborted);
            }
        }
        state.credits -= 1;
        Ok(true)
    }

    /// Drop all credits and release every blocked waiter
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.credits = 0;
        state.generation = state.generation.wrapping_add(1);
        self.available.notify_all();
    }

    /// Current number of credits
    pub fn count(&self) -> u64 {
        self.state.lock().credits
    }
}
