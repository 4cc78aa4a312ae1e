//! Simulated GPIO board and interrupt controller
//!
//! # Architecture
//! One mutex guards the board state (lines, jumpers, irq slots). Interrupt
//! dispatch never invokes a handler while holding that lock: the transition
//! path decides whether an irq fires under the lock, releases it, then takes
//! the irq's in-flight lock and re-checks that the irq is still registered
//! and unmasked before calling the handler. The in-flight lock gives two
//! guarantees the engines rely on:
//!
//! - at most one handler invocation per irq is in flight at any time, and
//! - masking or unregistering an irq blocks until a running invocation
//!   drains, so teardown can never free state out from under a handler.
//!
//! Handlers may call back into the controller (read a level, re-type their
//! own trigger); they run with only the in-flight lock held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::{Direction, HalError, IrqId, Level, Result, Trigger, IRQ_BASE};

/// Callback invoked once per delivered interrupt.
///
/// Runs on the thread that drove the triggering transition, serialized per
/// irq. Implementations must not block for long and must not call back into
/// the session teardown path.
pub trait IrqHandler: Send + Sync {
    fn handle(&self, irq: IrqId);
}

struct LineState {
    direction: Direction,
    level: Level,
    claimed: bool,
}

struct IrqSlot {
    trigger: Trigger,
    /// Mask nesting depth; 0 means delivery is enabled
    depth: u32,
    handler: Arc<dyn IrqHandler>,
    in_flight: Arc<Mutex<()>>,
}

#[derive(Default)]
struct Board {
    lines: HashMap<u32, LineState>,
    /// output pin -> input pin, the jumper wire of the physical rig
    jumpers: HashMap<u32, u32>,
    /// keyed by the input pin the irq is derived from
    irqs: HashMap<u32, IrqSlot>,
}

/// The simulated controller. Cheap to share; all methods take `&self`.
pub struct SimGpio {
    board: Mutex<Board>,
}

impl SimGpio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            board: Mutex::new(Board::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Short `out_pin` to `in_pin` with a jumper: every transition driven on
    /// the output is seen by the input line.
    pub fn wire(&self, out_pin: u32, in_pin: u32) {
        let mut board = self.lock();
        board.lines.entry(out_pin).or_insert(LineState {
            direction: Direction::Output,
            level: Level::Low,
            claimed: false,
        });
        board.lines.entry(in_pin).or_insert(LineState {
            direction: Direction::Input,
            level: Level::Low,
            claimed: false,
        });
        board.jumpers.insert(out_pin, in_pin);
        debug!("wired gpio {out_pin} -> gpio {in_pin}");
    }

    /// Claim exclusive ownership of a line. Fails with [`HalError::LineBusy`]
    /// while another handle holds the same pin.
    pub fn request_line(self: &Arc<Self>, pin: u32, direction: Direction) -> Result<LineHandle> {
        let mut board = self.lock();
        let line = board.lines.entry(pin).or_insert(LineState {
            direction,
            level: Level::Low,
            claimed: false,
        });
        if line.claimed {
            return Err(HalError::LineBusy { pin });
        }
        line.claimed = true;
        line.direction = direction;
        debug!("gpio {pin} claimed as {direction:?}");
        Ok(LineHandle {
            sim: Arc::clone(self),
            pin,
        })
    }

    /// The irq identifier bound to an input pin
    pub fn line_to_irq(&self, pin: u32) -> IrqId {
        IrqId(IRQ_BASE + pin)
    }

    /// Current level of a line
    pub fn level(&self, pin: u32) -> Result<Level> {
        let board = self.lock();
        board
            .lines
            .get(&pin)
            .map(|l| l.level)
            .ok_or(HalError::NoSuchLine { pin })
    }

    /// Register `handler` for `irq` with the given trigger, enabled.
    ///
    /// The returned registration unbinds on drop, blocking until any
    /// in-flight invocation has drained.
    pub fn request_irq(
        self: &Arc<Self>,
        irq: IrqId,
        trigger: Trigger,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqRegistration> {
        let pin = irq.pin();
        let mut board = self.lock();
        if !board.lines.contains_key(&pin) {
            return Err(HalError::NoSuchLine { pin });
        }
        if board.irqs.contains_key(&pin) {
            return Err(HalError::IrqAlreadyBound { irq });
        }
        board.irqs.insert(
            pin,
            IrqSlot {
                trigger,
                depth: 0,
                handler,
                in_flight: Arc::new(Mutex::new(())),
            },
        );
        debug!("registered irq {irq} for gpio {pin}, trigger {trigger:?}");
        Ok(IrqRegistration {
            sim: Arc::clone(self),
            irq,
        })
    }

    /// Gate delivery off for `irq`. Nests: n disables need n enables.
    /// Blocks until an in-flight handler invocation completes.
    pub fn disable_irq(&self, irq: IrqId) -> Result<()> {
        let in_flight = {
            let mut board = self.lock();
            let slot = board
                .irqs
                .get_mut(&irq.pin())
                .ok_or(HalError::NoHandler { irq })?;
            slot.depth += 1;
            Arc::clone(&slot.in_flight)
        };
        // Synchronize with a handler that was already running
        drop(in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(())
    }

    /// Undo one level of [`disable_irq`](Self::disable_irq)
    pub fn enable_irq(&self, irq: IrqId) -> Result<()> {
        let mut board = self.lock();
        let slot = board
            .irqs
            .get_mut(&irq.pin())
            .ok_or(HalError::NoHandler { irq })?;
        slot.depth = slot.depth.saturating_sub(1);
        Ok(())
    }

    /// Re-type the trigger condition. `Trigger::empty()` delivers nothing,
    /// which is the second masking mechanism the sequencer exercises.
    pub fn set_trigger(&self, irq: IrqId, trigger: Trigger) -> Result<()> {
        let mut board = self.lock();
        let slot = board
            .irqs
            .get_mut(&irq.pin())
            .ok_or(HalError::NoHandler { irq })?;
        slot.trigger = trigger;
        Ok(())
    }

    /// Apply external stimulus to an input line, as the signal generator on
    /// the rig does. Ownership is not required; this models hardware driving
    /// the pin from outside the session.
    pub fn stimulate(&self, pin: u32, level: Level) {
        self.transition(pin, level);
    }

    fn release_line(&self, pin: u32) {
        let mut board = self.lock();
        if let Some(line) = board.lines.get_mut(&pin) {
            line.claimed = false;
            debug!("gpio {pin} released");
        }
    }

    fn drive_output(&self, pin: u32, level: Level) -> Result<()> {
        let target = {
            let mut board = self.lock();
            let line = board
                .lines
                .get_mut(&pin)
                .ok_or(HalError::NoSuchLine { pin })?;
            if line.direction != Direction::Output {
                return Err(HalError::NotAnOutput { pin });
            }
            line.level = level;
            board.jumpers.get(&pin).copied()
        };
        if let Some(in_pin) = target {
            self.transition(in_pin, level);
        }
        Ok(())
    }

    /// Settle `pin` at `level` and deliver the irq bound to it, if armed.
    fn transition(&self, pin: u32, level: Level) {
        let fire = {
            let mut board = self.lock();
            let old = match board.lines.get_mut(&pin) {
                Some(line) => {
                    let old = line.level;
                    line.level = level;
                    old
                }
                None => return,
            };
            if old == level {
                return;
            }
            match board.irqs.get(&pin) {
                Some(slot) if slot.depth == 0 && slot.trigger.matches(old, level) => {
                    Some(Arc::clone(&slot.in_flight))
                }
                _ => None,
            }
        };

        let in_flight = match fire {
            Some(m) => m,
            None => return,
        };

        // Serialize with other invocations and with mask/teardown. The slot
        // is re-checked once the in-flight lock is held: a concurrent disable
        // or unbind that won the race suppresses this delivery.
        let _guard = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let handler = {
            let board = self.lock();
            match board.irqs.get(&pin) {
                Some(slot) if slot.depth == 0 => Some(Arc::clone(&slot.handler)),
                _ => None,
            }
        };
        if let Some(handler) = handler {
            handler.handle(self.line_to_irq(pin));
        }
    }

    fn free_irq(&self, irq: IrqId) {
        let slot = {
            let mut board = self.lock();
            board.irqs.remove(&irq.pin())
        };
        if let Some(slot) = slot {
            // Wait for a running invocation before the registration is gone
            drop(slot.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
            debug!("freed irq {irq}");
        }
    }
}

/// Exclusively-owned GPIO line; releases the claim on drop
pub struct LineHandle {
    sim: Arc<SimGpio>,
    pin: u32,
}

impl LineHandle {
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Drive the line (outputs only)
    pub fn set(&self, level: Level) -> Result<()> {
        self.sim.drive_output(self.pin, level)
    }

    /// Read the line's current level
    pub fn get(&self) -> Result<Level> {
        self.sim.level(self.pin)
    }
}

impl Drop for LineHandle {
    fn drop(&mut self) {
        self.sim.release_line(self.pin);
    }
}

/// Live interrupt registration; unbinds on drop after draining any
/// in-flight handler invocation
pub struct IrqRegistration {
    sim: Arc<SimGpio>,
    irq: IrqId,
}

impl IrqRegistration {
    pub fn irq(&self) -> IrqId {
        self.irq
    }
}

impl Drop for IrqRegistration {
    fn drop(&mut self) {
        self.sim.free_irq(self.irq);
    }
}
