//! Test configuration
//!
//! The knobs of the physical rig's load-time parameters, re-architected as
//! explicit values: a session captures a snapshot at open and holds it
//! immutably for its lifetime. The process-wide defaults may be changed
//! between sessions, never under a running one.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock, PoisonError};

use irqlab_hal::Level;

use crate::{EngineError, Result};

/// Most lines a board configuration may name
pub const MAX_PINS: usize = 8;
/// Most irq/drive pairs a board configuration may name
pub const MAX_PAIRS: usize = MAX_PINS / 2;

/// How an irq is masked during the sequencer's disabled phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// Gate delivery with enable/disable
    Gate,
    /// Re-type the trigger condition to "none"
    Retype,
}

/// Sequencer (mask/unmask edge tester) settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// First level driven onto the output line
    pub initial_level: Level,
    /// Pacing before and after each injected transition or mask action, ms
    pub pacing_ms: u64,
    /// Mask/unmask cycles to run
    pub cycles: u32,
    /// Transitions injected before the first unmask
    pub pre_events: u32,
    /// Transitions injected while unmasked, per cycle
    pub enabled_events: u32,
    /// Transitions injected while masked, per cycle
    pub disabled_events: u32,
    /// Masking mechanism under test
    pub mask_mode: MaskMode,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            initial_level: Level::Low,
            pacing_ms: 10,
            cycles: 5,
            pre_events: 5,
            enabled_events: 5,
            disabled_events: 4,
            mask_mode: MaskMode::Gate,
        }
    }
}

impl SequencerConfig {
    /// Transitions the whole sequence injects
    pub fn total_injected(&self) -> u64 {
        self.pre_events as u64
            + self.cycles as u64 * (self.enabled_events as u64 + self.disabled_events as u64)
    }

    /// Handler invocations a correctly masking controller delivers
    pub fn expected_hits(&self) -> u64 {
        self.cycles as u64 * self.enabled_events as u64
    }
}

/// Timing validator (level-flow tester) settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Events per statistics batch
    pub batch_size: u32,
    /// Expected interrupt-to-interrupt interval, us
    pub expected_interval_us: u64,
    /// Allowed skew around the expected interval, us
    pub tolerance_us: u64,
    /// Events excluded from interval checking after enable, while the line
    /// has no reliable last-timestamp baseline
    pub warmup_events: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            expected_interval_us: 500,
            tolerance_us: 100,
            warmup_events: 3,
        }
    }
}

impl ValidatorConfig {
    /// Acceptable interval window `[min, max]`
    pub fn window(&self) -> (u64, u64) {
        (
            self.expected_interval_us.saturating_sub(self.tolerance_us),
            self.expected_interval_us.saturating_add(self.tolerance_us),
        )
    }
}

/// The board's pin assignment: irq/drive pairs for the sequencer, single
/// irq pins for the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSet {
    Pairs(Vec<(u32, u32)>),
    Singles(Vec<u32>),
}

impl PinSet {
    pub fn validate(&self) -> Result<()> {
        match self {
            PinSet::Pairs(pairs) => {
                if pairs.is_empty() {
                    return Err(EngineError::BadPinSet {
                        reason: "no pin pairs configured",
                    });
                }
                if pairs.len() > MAX_PAIRS {
                    return Err(EngineError::BadPinSet {
                        reason: "more than 4 pin pairs",
                    });
                }
                if pairs.iter().any(|(a, b)| a == b) {
                    return Err(EngineError::BadPinSet {
                        reason: "pair shorts a pin to itself",
                    });
                }
            }
            PinSet::Singles(pins) => {
                if pins.is_empty() {
                    return Err(EngineError::BadPinSet {
                        reason: "no pins configured",
                    });
                }
                if pins.len() > MAX_PINS {
                    return Err(EngineError::BadPinSet {
                        reason: "more than 8 pins",
                    });
                }
            }
        }
        Ok(())
    }

    /// Logical slots this pin set provides
    pub fn slots(&self) -> usize {
        match self {
            PinSet::Pairs(pairs) => pairs.len(),
            PinSet::Singles(pins) => pins.len(),
        }
    }
}

impl Default for PinSet {
    /// The rig's default jumpered pair
    fn default() -> Self {
        PinSet::Pairs(vec![(16, 21)])
    }
}

/// Process-wide default configuration, read once at session open
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub pins: PinSet,
    pub sequencer: SequencerConfig,
    pub validator: ValidatorConfig,
}

fn defaults_cell() -> &'static Mutex<Defaults> {
    static CELL: OnceLock<Mutex<Defaults>> = OnceLock::new();
    CELL.get_or_init(|| Mutex::new(Defaults::default()))
}

/// Replace the process-wide defaults. Takes effect for sessions opened
/// afterwards; running sessions keep their snapshot.
pub fn set_defaults(defaults: Defaults) {
    *defaults_cell()
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = defaults;
}

/// Snapshot the process-wide defaults
pub fn defaults() -> Defaults {
    defaults_cell()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
