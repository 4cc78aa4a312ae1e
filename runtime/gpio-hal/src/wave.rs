//! Square-wave stimulus generator
//!
//! Stands in for the external signal generator the physical rig attaches to
//! the interrupt pin: a background thread toggles the line every half
//! period until the generator is dropped.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::debug;

use crate::{Level, SimGpio};

pub struct SquareWave {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl SquareWave {
    /// Start toggling `pin` every `half_period`, beginning with `first`.
    pub fn start(sim: Arc<SimGpio>, pin: u32, half_period: Duration, first: Level) -> Self {
        let (stop, ticks) = bounded::<()>(0);
        let thread = std::thread::spawn(move || {
            debug!("square wave on gpio {pin}, half period {half_period:?}");
            let mut level = first;
            loop {
                sim.stimulate(pin, level);
                level = !level;
                match ticks.recv_timeout(half_period) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            }
            debug!("square wave on gpio {pin} stopped");
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for SquareWave {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
