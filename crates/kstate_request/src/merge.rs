//! K-way streaming merge over trace cursors.
//!
//! One slot per source holds its current event; each step emits the slot
//! with the minimum timestamp (ties broken by source index, so the output
//! is deterministic) and refills only that slot.

use kstate_core::CoreResult;
use kstate_event::{EventCursor, RawEvent};

/// Merges N individually sorted cursors into one ordered stream
pub struct EventMerger {
    cursors: Vec<Box<dyn EventCursor>>,
    slots: Vec<Option<RawEvent>>,
}

impl EventMerger {
    /// Prime one slot per cursor
    ///
    /// # Errors
    ///
    /// Returns an error if any cursor fails on its first read.
    pub fn new(mut cursors: Vec<Box<dyn EventCursor>>) -> CoreResult<Self> {
        let mut slots = Vec::with_capacity(cursors.len());
        for cursor in &mut cursors {
            slots.push(cursor.next()?);
        }
        Ok(Self { cursors, slots })
    }

    /// Emit the next event and the index of the source it came from
    ///
    /// # Errors
    ///
    /// Returns an error if refilling the emitted slot fails.
    pub fn next(&mut self) -> CoreResult<Option<(usize, RawEvent)>> {
        let mut best: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(event) = slot else { continue };
            let better = match best {
                None => true,
                Some(b) => self.slots[b]
                    .as_ref()
                    .map_or(true, |current| event.timestamp < current.timestamp),
            };
            if better {
                best = Some(i);
            }
        }

        let Some(index) = best else {
            return Ok(None);
        };
        let Some(event) = self.slots[index].take() else {
            return Ok(None);
        };
        self.slots[index] = self.cursors[index].next()?;
        Ok(Some((index, event)))
    }
}
