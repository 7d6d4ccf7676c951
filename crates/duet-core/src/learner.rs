//! Turns live input into model updates.
//!
//! Note-ons go through the chord detector; each finalized group becomes one
//! [`ModelUpdate::Onset`]. Note-offs become [`ModelUpdate::Length`] using the
//! remembered onset of that note number.

use crate::config::EngineConfig;
use crate::quantize::quantize;
use crate::update_queue::ModelUpdate;
use duet_midi::{ChordDetector, ControllerValue, Group, NoteOnset};

const NOTE_COUNT: usize = 128;

#[derive(Debug, Clone)]
pub struct Learner {
    detector: ChordDetector,
    note_on_times: [Option<u64>; NOTE_COUNT],
    last_group_onset: Option<u64>,
    sample_rate: u64,
    max_ioi: u64,
}

impl Learner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            detector: ChordDetector::with_thresholds(
                config.note_burst_threshold(),
                config.controller_burst_threshold(),
            ),
            note_on_times: [None; NOTE_COUNT],
            last_group_onset: None,
            sample_rate: u64::from(config.sample_rate),
            max_ioi: config.max_ioi_samples(),
        }
    }

    /// Record a note-on. Returns the update for a group this note closed.
    ///
    /// `quantum` is the grid interval in samples when quantizing.
    pub fn note_on(
        &mut self,
        note: u8,
        velocity: u8,
        timestamp: u64,
        quantum: Option<u64>,
    ) -> Option<ModelUpdate> {
        let slot = self.note_on_times.get_mut(usize::from(note))?;
        *slot = Some(timestamp);
        self.detector.note_played(note, velocity, timestamp);
        let group = self.detector.take_ready_notes();
        self.finalize(group, quantum)
    }

    /// Record a note-off. Without a known onset the note is assumed to
    /// have lasted one second.
    pub fn note_off(&mut self, note: u8, timestamp: u64, quantum: Option<u64>) -> Option<ModelUpdate> {
        let slot = self.note_on_times.get_mut(usize::from(note))?;
        let onset = slot
            .take()
            .unwrap_or_else(|| timestamp.saturating_sub(self.sample_rate));
        let duration = timestamp.saturating_sub(onset);
        if duration == 0 {
            return None;
        }
        let samples = match quantum {
            Some(q) => quantize(duration, q),
            None => duration,
        };
        Some(ModelUpdate::Length { samples })
    }

    /// Record a controller move. Returns a controller burst it closed.
    pub fn controller(&mut self, controller: u8, value: u8, timestamp: u64) -> Group<ControllerValue> {
        self.detector.controller_moved(controller, value, timestamp);
        self.detector.take_ready_controllers()
    }

    /// Finalize a trailing chord without waiting for the next note.
    pub fn flush(&mut self, quantum: Option<u64>) -> Option<ModelUpdate> {
        self.detector.flush_notes();
        let group = self.detector.take_ready_notes();
        self.finalize(group, quantum)
    }

    pub fn set_thresholds(&mut self, note_threshold: u64, controller_threshold: u64) {
        self.detector.set_thresholds(note_threshold, controller_threshold);
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.note_on_times = [None; NOTE_COUNT];
        self.last_group_onset = None;
    }

    fn finalize(&mut self, group: Group<NoteOnset>, quantum: Option<u64>) -> Option<ModelUpdate> {
        let onset = group.iter().map(|n| n.timestamp).min()?;
        let velocity_sum: u32 = group.iter().map(|n| u32::from(n.velocity)).sum();
        let velocity = ((velocity_sum as f32 / group.len() as f32).round() as u8).max(1);

        let ioi = self
            .last_group_onset
            .map(|previous| onset.saturating_sub(previous))
            .filter(|&ioi| ioi > 0 && ioi < self.max_ioi)
            .map(|ioi| match quantum {
                Some(q) => quantize(ioi, q),
                None => ioi,
            });
        self.last_group_onset = Some(onset);

        Some(ModelUpdate::Onset {
            notes: group.iter().map(|n| n.note).collect(),
            velocity,
            polyphony: group.len(),
            ioi,
        })
    }
}
