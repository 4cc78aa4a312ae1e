//! Session lifecycle
//!
//! A session binds one logical test to exclusively-owned hardware: the
//! interrupt input line, optionally a drive output line, and the interrupt
//! registration. Acquisition order is input line -> irq id -> output line ->
//! registration; any failure on the way unwinds whatever was already
//! acquired. Teardown is the strict reverse - unbind the irq (draining any
//! in-flight handler invocation), release the output, release the input -
//! and is expressed through drop order, so a partially-built session unwinds
//! the same way a fully-built one does and a double release cannot exist.

use std::sync::Arc;

use log::debug;

use irqlab_hal::{Direction, IrqHandler, IrqId, IrqRegistration, LineHandle, SimGpio, Trigger};

use crate::Result;

/// One open-to-close test lifetime.
///
/// Field order is teardown order: the registration drops first (blocking
/// until an in-flight handler drains), then the drive line, then the input
/// line.
pub struct Session {
    registration: IrqRegistration,
    drive: Option<LineHandle>,
    line: LineHandle,
    irq: IrqId,
    pin: u32,
}

impl Session {
    /// Acquire lines and register `handler` on the input pin's irq.
    ///
    /// On any failure every resource acquired so far is released before the
    /// error is returned; an `Err` from `open` means nothing is held.
    pub fn open(
        gpio: &Arc<SimGpio>,
        pin: u32,
        drive_pin: Option<u32>,
        trigger: Trigger,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<Self> {
        let line = gpio.request_line(pin, Direction::Input)?;
        let irq = gpio.line_to_irq(pin);
        let drive = match drive_pin {
            Some(drive_pin) => Some(gpio.request_line(drive_pin, Direction::Output)?),
            None => None,
        };
        let registration = gpio.request_irq(irq, trigger, handler)?;
        debug!("session open: gpio {pin}, irq {irq}, drive {drive_pin:?}");
        Ok(Self {
            registration,
            drive,
            line,
            irq,
            pin,
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn irq(&self) -> IrqId {
        self.irq
    }

    /// The input line the irq is derived from
    pub fn line(&self) -> &LineHandle {
        &self.line
    }

    /// The drive output line, if this session owns one
    pub fn drive(&self) -> Option<&LineHandle> {
        self.drive.as_ref()
    }

    /// Tear the session down. Equivalent to dropping it; spelled out so
    /// call sites read like the close they are.
    pub fn close(self) {
        debug!("session close: gpio {}, irq {}", self.pin, self.irq);
    }

    /// The live interrupt registration
    pub fn registration(&self) -> &IrqRegistration {
        &self.registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct NopHandler(AtomicU64);

    impl NopHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(0)))
        }
    }

    impl IrqHandler for NopHandler {
        fn handle(&self, _irq: IrqId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn board() -> Arc<SimGpio> {
        let sim = SimGpio::new();
        sim.wire(21, 16);
        sim
    }

    #[test]
    fn open_binds_lines_and_registration() {
        let gpio = board();
        let session =
            Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).unwrap();
        assert_eq!(session.pin(), 16);
        assert_eq!(session.irq(), gpio.line_to_irq(16));
        assert!(session.drive().is_some());
        assert_eq!(session.registration().irq(), session.irq());
    }

    #[test]
    fn input_conflict_leaves_nothing_held() {
        let gpio = board();
        let holder = gpio.request_line(16, Direction::Input).unwrap();
        assert!(Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).is_err());
        drop(holder);

        // Both lines and the irq must still be free
        Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).unwrap();
    }

    #[test]
    fn drive_conflict_releases_the_input_line() {
        let gpio = board();
        let holder = gpio.request_line(21, Direction::Output).unwrap();
        assert!(Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).is_err());
        drop(holder);
        Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).unwrap();
    }

    #[test]
    fn registration_conflict_releases_both_lines() {
        let gpio = board();
        // Bind the irq from outside the session path
        let _blocker = {
            let probe = gpio.request_line(16, Direction::Input).unwrap();
            let registration = gpio
                .request_irq(gpio.line_to_irq(16), Trigger::EDGE_BOTH, NopHandler::new())
                .unwrap();
            drop(probe);
            registration
        };

        assert!(Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).is_err());

        // The failed open released its lines even though the irq stays bound
        let input = gpio.request_line(16, Direction::Input).unwrap();
        let output = gpio.request_line(21, Direction::Output).unwrap();
        drop((input, output));
    }

    #[test]
    fn close_frees_everything_for_reopen() {
        let gpio = board();
        for _ in 0..100 {
            let session =
                Session::open(&gpio, 16, Some(21), Trigger::EDGE_BOTH, NopHandler::new()).unwrap();
            session.close();
        }
    }

    #[test]
    fn validator_shape_session_has_no_drive_line() {
        let gpio = board();
        let session =
            Session::open(&gpio, 16, None, Trigger::LEVEL_HIGH, NopHandler::new()).unwrap();
        assert!(session.drive().is_none());
        // The drive pin was never claimed
        gpio.request_line(21, Direction::Output).unwrap();
    }
}
