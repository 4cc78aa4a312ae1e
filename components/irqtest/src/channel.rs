//! Blocking completion channel
//!
//! Single-slot wake mechanism from the interrupt handler to the blocking
//! consumer. The handler writes a finished batch snapshot and notifies; the
//! consumer takes the snapshot or blocks until one arrives. Publishing the
//! snapshot through the mutex is the happens-before boundary: every field of
//! the report is written before the slot becomes visible to the waiter.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::{CancelToken, EngineError, Result};

/// How often a blocked waiter re-checks its cancel token
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Snapshot of one closed statistics batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Input pin the batch was measured on
    pub pin: u32,
    /// Events in the batch
    pub events: u32,
    /// Microseconds from the batch's first event to its last
    pub duration_us: u64,
    /// Out-of-tolerance or wrong-level events in the batch
    pub bad: u64,
}

/// Per-session single-slot completion channel
pub struct Completion {
    slot: Mutex<Option<BatchReport>>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Publish a finished batch and wake the waiter. A snapshot that was
    /// never consumed is overwritten; the channel always holds the most
    /// recently closed batch.
    pub fn signal(&self, report: BatchReport) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(report);
        self.cond.notify_one();
    }

    /// Block until a batch is available, consuming it. An already-signalled
    /// slot is observed immediately. Cancellation surfaces as
    /// [`EngineError::Interrupted`]; the slot is left untouched in that case
    /// so a retried wait can still observe it.
    pub fn wait(&self, cancel: &CancelToken) -> Result<BatchReport> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(report) = slot.take() {
                return Ok(report);
            }
            if cancel.is_cancelled() {
                return Err(EngineError::Interrupted);
            }
            let (guard, _timeout) = self
                .cond
                .wait_timeout(slot, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    /// Discard a stale snapshot without blocking
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn report(bad: u64) -> BatchReport {
        BatchReport {
            pin: 16,
            events: 10,
            duration_us: 5000,
            bad,
        }
    }

    #[test]
    fn already_signalled_slot_is_observed_immediately() {
        let completion = Completion::new();
        completion.signal(report(0));
        let got = completion.wait(&CancelToken::new()).unwrap();
        assert_eq!(got, report(0));
    }

    #[test]
    fn wait_blocks_until_signal() {
        let completion = Arc::new(Completion::new());
        let signaller = completion.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            signaller.signal(report(2));
        });
        let got = completion.wait(&CancelToken::new()).unwrap();
        assert_eq!(got.bad, 2);
        thread.join().unwrap();
    }

    #[test]
    fn later_signal_overwrites_unconsumed_slot() {
        let completion = Completion::new();
        completion.signal(report(1));
        completion.signal(report(7));
        let got = completion.wait(&CancelToken::new()).unwrap();
        assert_eq!(got.bad, 7);
    }

    #[test]
    fn wait_consumes_the_slot() {
        let completion = Completion::new();
        completion.signal(report(0));
        completion.wait(&CancelToken::new()).unwrap();
        // Second wait must block again; prove it via cancellation
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            completion.wait(&cancel),
            Err(EngineError::Interrupted)
        ));
    }

    #[test]
    fn cancelled_wait_is_retryable() {
        let completion = Completion::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            completion.wait(&cancel),
            Err(EngineError::Interrupted)
        ));

        // State is intact: the next signal is observed by a fresh wait
        cancel.reset();
        completion.signal(report(3));
        assert_eq!(completion.wait(&cancel).unwrap().bad, 3);
    }

    #[test]
    fn cancel_unblocks_a_parked_waiter() {
        let completion = Arc::new(Completion::new());
        let cancel = CancelToken::new();
        let waiter_cancel = cancel.clone();
        let waiter = {
            let completion = completion.clone();
            std::thread::spawn(move || completion.wait(&waiter_cancel))
        };
        std::thread::sleep(Duration::from_millis(10));
        cancel.cancel();
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(EngineError::Interrupted)));
    }

    #[test]
    fn clear_discards_stale_snapshot() {
        let completion = Completion::new();
        completion.signal(report(5));
        completion.clear();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            completion.wait(&cancel),
            Err(EngineError::Interrupted)
        ));
    }
}
