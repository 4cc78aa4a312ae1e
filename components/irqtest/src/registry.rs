//! Session registry
//!
//! Maps a logical pin-pair (or single-pin) index to a session-owning slot.
//! Absence is explicit: a slot either holds a live session or holds nothing,
//! and closing an empty slot is a harmless no-op.

use crate::{EngineError, Result};

/// Fixed-capacity table of optional sessions, indexed by logical slot
pub struct SessionTable<S> {
    slots: Vec<Option<S>>,
}

impl<S> SessionTable<S> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Open a session into `index` with `open`, failing with
    /// [`EngineError::SlotBusy`] if the slot is occupied. The opener only
    /// runs when the slot is free, so a failed open leaves the table
    /// unchanged.
    pub fn open_with<F>(&mut self, index: usize, open: F) -> Result<&mut S>
    where
        F: FnOnce() -> Result<S>,
    {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(EngineError::NoSuchSlot { index })?;
        if slot.is_some() {
            return Err(EngineError::SlotBusy { index });
        }
        Ok(slot.insert(open()?))
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Take the session out of `index`, returning it so the caller can run
    /// teardown. `None` if the slot was already empty.
    pub fn take(&mut self, index: usize) -> Option<S> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Close the session in `index`, if any. Safe to call repeatedly.
    pub fn close(&mut self, index: usize) -> bool {
        self.take(index).is_some()
    }

    /// Indices of currently open slots
    pub fn open_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
    }
}
