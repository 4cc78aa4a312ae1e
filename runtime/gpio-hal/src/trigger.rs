//! Interrupt trigger conditions
//!
//! Trigger typing doubles as a masking mechanism: re-typing an irq to
//! `Trigger::empty()` ("none") stops delivery without gating the line, the
//! second of the two masking modes the sequencer engine exercises.

use bitflags::bitflags;

use crate::Level;

bitflags! {
    /// Condition under which a line transition fires its irq
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trigger: u32 {
        /// Fire on a low-to-high edge
        const RISING = 1 << 0;
        /// Fire on a high-to-low edge
        const FALLING = 1 << 1;
        /// Fire while the line is high
        const LEVEL_HIGH = 1 << 2;
        /// Fire while the line is low
        const LEVEL_LOW = 1 << 3;
        /// Fire on either edge
        const EDGE_BOTH = Self::RISING.bits() | Self::FALLING.bits();
    }
}

impl Trigger {
    /// The level trigger that detects `level`
    pub fn for_level(level: Level) -> Trigger {
        match level {
            Level::High => Trigger::LEVEL_HIGH,
            Level::Low => Trigger::LEVEL_LOW,
        }
    }

    /// Whether a transition from `old` to `new` satisfies this trigger.
    ///
    /// Level triggers are evaluated against the level the line settles at
    /// after the transition; the simulated controller delivers one event per
    /// transition rather than re-firing for the duration of the level.
    pub fn matches(self, old: Level, new: Level) -> bool {
        if old == new {
            return false;
        }
        if self.contains(Trigger::RISING) && new == Level::High {
            return true;
        }
        if self.contains(Trigger::FALLING) && new == Level::Low {
            return true;
        }
        if self.contains(Trigger::LEVEL_HIGH) && new == Level::High {
            return true;
        }
        if self.contains(Trigger::LEVEL_LOW) && new == Level::Low {
            return true;
        }
        false
    }
}
