//! Interrupt test engines for irqlab
//!
//! # Purpose
//! Validates the behaviour of a GPIO interrupt controller under two
//! scenarios: scripted mask/unmask cycles with injected edges (the
//! [`Sequencer`]), and continuous level-triggered interrupts on a periodic
//! square wave with inter-arrival timing checks (the [`Validator`]).
//!
//! # Integration Points
//! - Depends on: `irqlab-hal` (lines, irqs, clocks)
//! - Provides to: `irqlab-run` CLI, any consumer driving a test session
//!
//! # Architecture
//! Each test runs inside a *session*: one open-to-close lifetime binding
//! exclusively-owned lines and an interrupt registration
//! ([`session::Session`]). The validator's interrupt handler communicates
//! with the blocking consumer only through a single-slot completion channel
//! ([`channel::Completion`]); there is no other shared state across the two
//! execution contexts. Timing and level anomalies are observations, never
//! errors: they increment counters and emit warn-level logs.
//!
//! # Testing Strategy
//! - Unit tests: channel semantics, config defaults, registry slots
//! - Integration tests: full sequencer and validator scenarios on the
//!   simulated board with a manual clock

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use irqlab_hal::HalError;

pub mod channel;
pub mod config;
pub mod registry;
pub mod sequencer;
pub mod session;
pub mod validator;

pub use channel::{BatchReport, Completion};
pub use config::{Defaults, MaskMode, PinSet, SequencerConfig, ValidatorConfig};
pub use registry::SessionTable;
pub use sequencer::Sequencer;
pub use session::Session;
pub use validator::{format_report, Validator};

/// Error types for session and engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Hardware acquisition or registration failed; the session was fully
    /// unwound and holds nothing.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// The blocking operation was cancelled. Retryable: session state is
    /// intact and a fresh call will block (or complete) normally.
    #[error("interrupted, retry")]
    Interrupted,

    /// The registry slot already holds a live session
    #[error("session slot {index} is already open")]
    SlotBusy { index: usize },

    /// The registry has no slot at this index
    #[error("no session slot {index}")]
    NoSuchSlot { index: usize },

    /// The configured pin list is malformed
    #[error("bad pin set: {reason}")]
    BadPinSet { reason: &'static str },
}

impl EngineError {
    /// Whether the caller may simply retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Interrupted)
    }
}

pub type Result<T> = core::result::Result<T, EngineError>;

/// Cooperative cancellation for blocking operations.
///
/// Stands in for signal delivery: cancelling makes any blocked read or
/// running sequence return [`EngineError::Interrupted`] at its next
/// boundary.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the token so the next blocking call proceeds normally
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
