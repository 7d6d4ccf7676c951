//! Burst detection: grouping near-simultaneous events.
//!
//! Events closer together than a threshold belong to the same burst (a
//! chord, or a sweep of controller moves). A burst is only known to be
//! complete when the next event arrives after a longer gap, so groups are
//! finalized lazily on arrival, never from elapsed time alone. Call
//! [`BurstDetector::flush`] to finalize a trailing group explicitly.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Inline capacity of a group; larger chords spill to the heap.
const GROUP_INLINE: usize = 8;

pub type Group<T> = SmallVec<[T; GROUP_INLINE]>;

/// Accumulator plus one-shot ready slot.
#[derive(Debug, Clone)]
pub struct BurstDetector<T> {
    threshold: u64,
    pending: Group<T>,
    ready: Group<T>,
    last_timestamp: Option<u64>,
}

impl<T> BurstDetector<T> {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            pending: SmallVec::new(),
            ready: SmallVec::new(),
            last_timestamp: None,
        }
    }

    #[inline]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u64) {
        self.threshold = threshold;
    }

    /// Add one event. A gap above the threshold finalizes the accumulator first.
    pub fn add(&mut self, item: T, timestamp: u64) {
        self.add_filtered(item, timestamp, |_, _| true);
    }

    /// As [`add`](Self::add), keeping only the pending items for which
    /// `keep(old, new)` holds when a group is finalized.
    pub(crate) fn add_filtered(
        &mut self,
        item: T,
        timestamp: u64,
        keep: impl Fn(&T, &T) -> bool,
    ) {
        let gap = self
            .last_timestamp
            .map(|last| timestamp.saturating_sub(last))
            .unwrap_or(0);
        if gap > self.threshold && !self.pending.is_empty() {
            if !self.ready.is_empty() {
                tracing::debug!(
                    "Burst group of {} replaced before it was consumed",
                    self.ready.len()
                );
            }
            self.ready.clear();
            for old in self.pending.drain(..) {
                if keep(&old, &item) {
                    self.ready.push(old);
                }
            }
        }
        self.pending.push(item);
        self.last_timestamp = Some(timestamp);
    }

    /// Take the finalized group, leaving the slot empty.
    pub fn take_ready(&mut self) -> Group<T> {
        std::mem::take(&mut self.ready)
    }

    #[inline]
    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Finalize the accumulator now, without waiting for another event.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.ready.clear();
        self.ready.extend(self.pending.drain(..));
    }

    #[inline]
    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.ready.clear();
        self.last_timestamp = None;
    }
}

/// A note-on as seen by the chord detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteOnset {
    pub note: u8,
    pub velocity: u8,
    pub timestamp: u64,
}

/// One controller move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerValue {
    pub controller: u8,
    pub value: u8,
}

/// Note and controller burst detectors with independent thresholds and clocks.
///
/// Controller groups are last-value-wins across the finalize boundary: a
/// queued value is dropped when the event that closes its group moves the
/// same controller.
#[derive(Debug, Clone)]
pub struct ChordDetector {
    notes: BurstDetector<NoteOnset>,
    controllers: BurstDetector<ControllerValue>,
}

impl ChordDetector {
    /// Thresholds of `sample_rate / 40` for notes, `sample_rate / 16` for controllers.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_thresholds(
            u64::from(sample_rate / 40),
            u64::from(sample_rate / 16),
        )
    }

    pub fn with_thresholds(note_threshold: u64, controller_threshold: u64) -> Self {
        Self {
            notes: BurstDetector::new(note_threshold),
            controllers: BurstDetector::new(controller_threshold),
        }
    }

    pub fn note_played(&mut self, note: u8, velocity: u8, timestamp: u64) {
        self.notes.add(
            NoteOnset {
                note,
                velocity,
                timestamp,
            },
            timestamp,
        );
    }

    pub fn controller_moved(&mut self, controller: u8, value: u8, timestamp: u64) {
        self.controllers.add_filtered(
            ControllerValue { controller, value },
            timestamp,
            |old, new| old.controller != new.controller,
        );
    }

    pub fn take_ready_notes(&mut self) -> Group<NoteOnset> {
        self.notes.take_ready()
    }

    pub fn take_ready_controllers(&mut self) -> Group<ControllerValue> {
        self.controllers.take_ready()
    }

    /// Finalize a trailing chord (e.g. after input went silent).
    pub fn flush_notes(&mut self) {
        self.notes.flush();
    }

    pub fn flush_controllers(&mut self) {
        self.controllers.flush();
    }

    pub fn set_thresholds(&mut self, note_threshold: u64, controller_threshold: u64) {
        self.notes.set_threshold(note_threshold);
        self.controllers.set_threshold(controller_threshold);
    }

    pub fn notes(&self) -> &BurstDetector<NoteOnset> {
        &self.notes
    }

    pub fn controllers(&self) -> &BurstDetector<ControllerValue> {
        &self.controllers
    }

    pub fn reset(&mut self) {
        self.notes.reset();
        self.controllers.reset();
    }
}
