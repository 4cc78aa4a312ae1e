//! GPIO Hardware Abstraction - lines, interrupts and clocks for irqlab
//!
//! # Purpose
//! Provides the hardware surface the irqlab test engines run against: GPIO
//! lines with exclusive ownership, an interrupt controller with per-line
//! registration, trigger typing and nested masking, and monotonic clock
//! sources for interval measurement.
//!
//! # Integration Points
//! - Depends on: nothing below it (this is the bottom of the stack)
//! - Provides to: `irqlab-irqtest` engines, `irqlab-run` CLI
//!
//! # Architecture
//! The backend is a software-simulated board ([`SimGpio`]): pins can be
//! wired together the way the physical rig shorts the drive pin to the
//! interrupt pin with a jumper, and external stimulus can be applied to an
//! input line directly. Interrupt delivery is evaluated on every line
//! transition and handlers run serialized per irq, on the driving thread,
//! so the whole controller behaves deterministically on a host.
//!
//! # Testing Strategy
//! - Unit tests: ownership conflicts, trigger matching, mask nesting
//! - Integration tests: handler drain on teardown, wired pin pairs

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod clock;
mod sim;
mod trigger;
mod wave;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use sim::{IrqHandler, IrqRegistration, LineHandle, SimGpio};
pub use trigger::Trigger;
pub use wave::SquareWave;

/// Base offset for irq numbers derived from input pins, so that pin and irq
/// identifiers are visibly distinct in logs (pin 16 -> irq 48).
pub const IRQ_BASE: u32 = 32;

/// Error types for hardware-line and interrupt operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("gpio line {pin} is already claimed by another owner")]
    LineBusy { pin: u32 },

    #[error("gpio line {pin} does not exist on this board")]
    NoSuchLine { pin: u32 },

    #[error("gpio line {pin} is not configured as an output")]
    NotAnOutput { pin: u32 },

    #[error("irq {irq} already has a registered handler")]
    IrqAlreadyBound { irq: IrqId },

    #[error("irq {irq} has no registered handler")]
    NoHandler { irq: IrqId },
}

pub type Result<T> = core::result::Result<T, HalError>;

/// Logic level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl core::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl core::fmt::Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Matches the numeric form the rig logs use
        match self {
            Level::Low => write!(f, "0"),
            Level::High => write!(f, "1"),
        }
    }
}

/// Configured direction of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Interrupt line identifier, bound 1:1 to an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrqId(pub u32);

impl IrqId {
    /// The input pin this irq is derived from
    pub fn pin(self) -> u32 {
        self.0 - IRQ_BASE
    }
}

impl core::fmt::Display for IrqId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_toggles() {
        assert_eq!(!Level::Low, Level::High);
        assert_eq!(!Level::High, Level::Low);
        assert!(Level::High.is_high());
        assert_eq!(Level::from_bool(false), Level::Low);
    }

    #[test]
    fn level_displays_as_digit() {
        assert_eq!(Level::Low.to_string(), "0");
        assert_eq!(Level::High.to_string(), "1");
    }

    #[test]
    fn irq_id_round_trips_pin() {
        let irq = IrqId(IRQ_BASE + 16);
        assert_eq!(irq.pin(), 16);
        assert_eq!(irq.to_string(), (IRQ_BASE + 16).to_string());
    }
}
