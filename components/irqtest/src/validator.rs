//! Timing validator engine - level-triggered flow tester
//!
//! A periodic square wave feeds the interrupt pin. On every interrupt the
//! handler re-arms the controller for the opposite level, timestamps the
//! event and checks the inter-arrival interval and the observed level
//! against the configured expectations. Out-of-tolerance or wrong-level
//! events are counted and warn-logged, never raised as errors. Every
//! `batch_size` events the counters are snapshotted into a report and the
//! blocking reader is woken through the completion channel.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use irqlab_hal::{Clock, IrqHandler, IrqId, Level, SimGpio, Trigger};

use crate::channel::{BatchReport, Completion};
use crate::config::ValidatorConfig;
use crate::session::Session;
use crate::{CancelToken, Result};

/// Live counters, owned by the handler and touched only with the handler's
/// stats lock held. The completion channel is the only way any of this
/// reaches the foreground.
struct FlowStats {
    /// Event count within the current batch. Starts at `-warmup` so the
    /// first events after enable are excluded from interval checking; the
    /// `count == 0` event establishes the batch's first timestamp.
    count: i64,
    /// Bad events in the current batch
    bad: u64,
    /// Timestamp of the previous event
    last_us: u64,
    /// Timestamp of the current batch's first event
    first_us: u64,
    /// Previous inter-arrival interval, logged alongside the current one
    last_interval_us: u64,
    /// Level observed at the previous event
    last_value: Level,
    /// Level the controller is currently armed to detect
    expected: Level,
}

/// Interrupt-context half of the validator. Fast and non-blocking: reads
/// the line, re-arms, updates counters, and signals at batch boundaries.
struct FlowHandler {
    gpio: Arc<SimGpio>,
    clock: Arc<dyn Clock>,
    pin: u32,
    config: ValidatorConfig,
    completion: Arc<Completion>,
    stats: Mutex<FlowStats>,
}

impl IrqHandler for FlowHandler {
    fn handle(&self, irq: IrqId) {
        // Acquire the event and re-arm for the opposite level before
        // trusting any further observation
        let value = match self.gpio.level(self.pin) {
            Ok(value) => value,
            Err(_) => return,
        };
        let now = self.clock.now_us();

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .gpio
            .set_trigger(irq, Trigger::for_level(!stats.expected))
            .is_err()
        {
            // Registration already torn down; nothing to record
            return;
        }

        let (tmin, tmax) = self.config.window();
        let interval = now.saturating_sub(stats.last_us);

        if stats.count <= 0 {
            debug!(
                "irq {}:{irq} - val {} -> {value} : {} after {interval} / {} us  bad ev.: {}:{}",
                self.pin, stats.last_value, stats.expected, stats.last_interval_us, stats.bad,
                stats.count
            );
        }

        if stats.count > 0 && (interval > tmax || interval < tmin || value != stats.expected) {
            stats.bad += 1;
            warn!(
                "irq {}:{irq} - val {} -> {value} : {} after {interval} / {} us  bad ev.: {}:{}",
                self.pin, stats.last_value, stats.expected, stats.last_interval_us, stats.bad,
                stats.count
            );
        }

        stats.last_value = value;
        stats.last_interval_us = interval;
        stats.last_us = now;

        if stats.count == 0 {
            stats.first_us = now;
        }
        if stats.count == self.config.batch_size as i64 {
            // Close the batch in this very invocation: snapshot, reset, and
            // count this event as the first of the next batch
            let report = BatchReport {
                pin: self.pin,
                events: self.config.batch_size,
                duration_us: now.saturating_sub(stats.first_us),
                bad: stats.bad,
            };
            stats.bad = 0;
            stats.first_us = now;
            stats.count = 1;
            self.completion.signal(report);
        } else {
            stats.count += 1;
        }

        stats.expected = !stats.expected;
    }
}

/// One timing-validator session on a single interrupt pin
pub struct Validator {
    session: Session,
    completion: Arc<Completion>,
    cancel: CancelToken,
}

impl Validator {
    /// Open a session on `pin`, armed for a high level first (the square
    /// wave's rising half-cycle).
    pub fn open(
        gpio: &Arc<SimGpio>,
        clock: Arc<dyn Clock>,
        pin: u32,
        config: ValidatorConfig,
    ) -> Result<Self> {
        let completion = Arc::new(Completion::new());
        let handler = Arc::new(FlowHandler {
            gpio: Arc::clone(gpio),
            clock,
            pin,
            config,
            completion: completion.clone(),
            stats: Mutex::new(FlowStats {
                count: -(config.warmup_events as i64),
                bad: 0,
                last_us: 0,
                first_us: 0,
                last_interval_us: 0,
                last_value: Level::Low,
                expected: Level::High,
            }),
        });
        let session = Session::open(gpio, pin, None, Trigger::LEVEL_HIGH, handler)?;
        Ok(Self {
            session,
            completion,
            cancel: CancelToken::new(),
        })
    }

    pub fn pin(&self) -> u32 {
        self.session.pin()
    }

    /// Token that makes a blocked read return [`EngineError::Interrupted`]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the next batch closes and return its snapshot
    pub fn next_report(&self) -> Result<BatchReport> {
        self.completion.wait(&self.cancel)
    }

    /// Block until the next batch closes, then format its one-line record
    /// into `buf`, truncating to the buffer's capacity. Returns the number
    /// of bytes written.
    pub fn read_batch(&self, buf: &mut [u8]) -> Result<usize> {
        let report = self.next_report()?;
        let line = format_report(&report);
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line.as_bytes()[..n]);
        Ok(n)
    }

    /// Consume the engine and release the session
    pub fn close(self) {
        self.session.close();
    }
}

/// The fixed one-line textual record of a closed batch
pub fn format_report(report: &BatchReport) -> String {
    render(report, &wall_stamp())
}

fn render(report: &BatchReport, stamp: &str) -> String {
    format!(
        "{stamp} Events: {} in {} usec on pin {}. Bad events: {}\n",
        report.events, report.duration_us, report.pin, report.bad
    )
}

fn wall_stamp() -> String {
    let format =
        time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    time::OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}
