//! Sequencer engine - mask/unmask edge tester
//!
//! Drives the output pin through a scripted sequence of level transitions
//! while alternately masking and unmasking the interrupt input:
//!
//! `masked(pre) -> [unmasked(enab) -> masked(disab)] x cycles -> done`
//!
//! Every injected transition toggles the drive level, masked or not; the
//! point of the test is that the handler fires (and logs) for exactly the
//! unmasked injections and for nothing else. Both masking mechanisms are
//! exercised: gating delivery, and re-typing the trigger to "none".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use irqlab_hal::{IrqHandler, IrqId, Level, SimGpio, Trigger};

use crate::config::{MaskMode, SequencerConfig};
use crate::session::Session;
use crate::{CancelToken, EngineError, Result};

/// Logs each delivered interrupt with the drive and input levels, and
/// counts deliveries for the foreground to inspect per phase.
struct EdgeHandler {
    gpio: Arc<SimGpio>,
    pin: u32,
    drive_pin: u32,
    hits: AtomicU64,
}

impl IrqHandler for EdgeHandler {
    fn handle(&self, irq: IrqId) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let drive = self.gpio.level(self.drive_pin);
        let input = self.gpio.level(self.pin);
        if let (Ok(drive), Ok(input)) = (drive, input) {
            debug!("irq {}:{irq} - val {drive} -> {input}", self.pin);
        }
    }
}

/// One sequencer session on a jumpered pin pair
pub struct Sequencer {
    session: Session,
    gpio: Arc<SimGpio>,
    handler: Arc<EdgeHandler>,
    config: SequencerConfig,
    cancel: CancelToken,
    next_level: Level,
}

impl Sequencer {
    /// Open a session on the `(irq_pin, drive_pin)` pair. The handler is
    /// registered for both edges, enabled; the run itself starts by
    /// masking.
    pub fn open(gpio: &Arc<SimGpio>, pins: (u32, u32), config: SequencerConfig) -> Result<Self> {
        let (pin, drive_pin) = pins;
        let handler = Arc::new(EdgeHandler {
            gpio: Arc::clone(gpio),
            pin,
            drive_pin,
            hits: AtomicU64::new(0),
        });
        let session = Session::open(
            gpio,
            pin,
            Some(drive_pin),
            Trigger::EDGE_BOTH,
            handler.clone(),
        )?;
        Ok(Self {
            session,
            gpio: Arc::clone(gpio),
            handler,
            config,
            cancel: CancelToken::new(),
            next_level: config.initial_level,
        })
    }

    /// Token that aborts a running sequence at its next pacing boundary
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Interrupts delivered to this session's handler so far
    pub fn hits(&self) -> u64 {
        self.handler.hits.load(Ordering::SeqCst)
    }

    pub fn pin(&self) -> u32 {
        self.session.pin()
    }

    /// Drive the full scripted sequence.
    ///
    /// Never completes normally: end-of-sequence and cancellation both
    /// surface as [`EngineError::Interrupted`], the restart-on-signal
    /// contract of the blocking read this call backs. Teardown is the
    /// session close, regardless of the phase this returns from.
    pub fn run(&mut self) -> Result<()> {
        let config = self.config;
        self.next_level = config.initial_level;

        debug!(
            "gpio {}:{} - disabling irq and starting test",
            self.session.pin(),
            self.handler.drive_pin
        );
        self.mask()?;
        self.pace()?;
        self.inject(config.pre_events)?;

        for _ in 0..config.cycles {
            debug!("gpio {} - enabling irq", self.session.pin());
            self.unmask()?;
            self.pace()?;
            self.inject(config.enabled_events)?;

            debug!("gpio {} - disabling irq", self.session.pin());
            self.mask()?;
            self.pace()?;
            self.inject(config.disabled_events)?;
        }

        Err(EngineError::Interrupted)
    }

    /// Consume the engine and release the session
    pub fn close(self) {
        self.session.close();
    }

    fn mask(&self) -> Result<()> {
        match self.config.mask_mode {
            MaskMode::Gate => self.gpio.disable_irq(self.session.irq())?,
            MaskMode::Retype => self.gpio.set_trigger(self.session.irq(), Trigger::empty())?,
        }
        Ok(())
    }

    fn unmask(&self) -> Result<()> {
        match self.config.mask_mode {
            MaskMode::Gate => self.gpio.enable_irq(self.session.irq())?,
            MaskMode::Retype => self.gpio.set_trigger(self.session.irq(), Trigger::EDGE_BOTH)?,
        }
        Ok(())
    }

    /// Toggle the drive line `count` times, pacing after each transition
    fn inject(&mut self, count: u32) -> Result<()> {
        for _ in 0..count {
            debug!(
                "gpio {} - sending {}",
                self.handler.drive_pin, self.next_level
            );
            if let Some(drive) = self.session.drive() {
                drive.set(self.next_level)?;
            }
            self.next_level = !self.next_level;
            self.pace()?;
        }
        Ok(())
    }

    fn pace(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        if self.config.pacing_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.pacing_ms));
        }
        Ok(())
    }
}
