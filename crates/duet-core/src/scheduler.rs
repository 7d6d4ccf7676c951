//! Sample-accurate scheduling of generated notes.
//!
//! The scheduler owns the play cursor (`next_play_time`) and one note-off
//! deadline per note number. Each call to [`Scheduler::process`] covers the
//! block `[elapsed, elapsed + block_len)`:
//!
//! 1. deadlines inside the block (or already passed) become note-offs
//! 2. a cursor left behind the block snaps forward to the block end
//! 3. if the cursor falls inside the block, one cycle is generated
//! 4. deadlines of notes that ended inside the block are flushed
//!
//! The cursor is never left before the block start when `process` returns.

use crate::clock::Grid;
use crate::models::{Draw, ModelSet};
use duet_markov::{GenerationContext, Token};
use duet_midi::{Message, MidiEvent};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const NOTE_COUNT: usize = 128;
const MIDI_CHANNELS: u8 = 16;

/// Pitch-model entries needed before anything is generated.
const MIN_MODEL_SIZE: usize = 2;

/// Used when the velocity model has nothing usable.
const DEFAULT_VELOCITY: u8 = 100;

/// Per-block inputs to a scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSettings {
    pub playing: bool,
    /// Tick grid for this block, if the clock produced one.
    pub grid: Option<Grid>,
    /// Onsets snap to `grid`; without a grid nothing is due.
    pub sync_to_grid: bool,
    /// Move the cursor to the next tick before anything else.
    pub realign: bool,
    pub play_probability: f32,
    pub require_choices: bool,
    /// Output channel, 0-15.
    pub channel: u8,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            playing: true,
            grid: None,
            sync_to_grid: false,
            realign: false,
            play_probability: 1.0,
            require_choices: false,
            channel: 0,
        }
    }
}

/// What happened in one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// The cursor was not inside the block.
    NotDue,
    /// Due, but the models are too small to generate from.
    Starved,
    /// The play-probability draw failed; the cursor still advanced.
    Silent,
    /// The inter-onset interval was unusable; notes dropped, cursor kept.
    Discarded,
    /// Notes started this block.
    Played(usize),
}

#[derive(Debug)]
pub struct Scheduler {
    elapsed: u64,
    next_play_time: u64,
    /// Absolute sample of each sounding note's release, 0 = silent.
    note_off_deadlines: [u64; NOTE_COUNT],
    rng: StdRng,
}

impl Scheduler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            elapsed: 0,
            next_play_time: 0,
            note_off_deadlines: [0; NOTE_COUNT],
            rng,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    #[inline]
    pub fn next_play_time(&self) -> u64 {
        self.next_play_time
    }

    /// Release deadline of `note`, if it is sounding.
    pub fn deadline(&self, note: u8) -> Option<u64> {
        self.note_off_deadlines
            .get(usize::from(note))
            .copied()
            .filter(|&deadline| deadline != 0)
    }

    /// Notes with a pending note-off.
    pub fn sounding(&self) -> impl Iterator<Item = u8> + '_ {
        (0..NOTE_COUNT as u8).filter(|&note| self.deadline(note).is_some())
    }

    /// Schedule one block, appending events to `out` (unsorted).
    pub fn process(
        &mut self,
        block_len: u64,
        models: &ModelSet,
        source: GenerationContext,
        settings: &CycleSettings,
        out: &mut Vec<MidiEvent>,
    ) -> Cycle {
        if block_len == 0 {
            return Cycle::NotDue;
        }
        let start = self.elapsed;
        let end = start + block_len;

        self.flush_deadlines(start, end, settings.channel, out);

        if settings.realign {
            if let Some(grid) = settings.grid {
                self.next_play_time = grid.next_boundary(start);
            }
        }
        if self.next_play_time < start {
            self.next_play_time = match settings.grid {
                Some(grid) if settings.sync_to_grid => grid.next_boundary(end),
                _ => end,
            };
        }

        let clock_ready = !settings.sync_to_grid || settings.grid.is_some();
        let cycle = if settings.playing && clock_ready && self.next_play_time < end {
            self.run_cycle(start, models, source, settings, out)
        } else {
            Cycle::NotDue
        };

        self.flush_deadlines(start, end, settings.channel, out);
        self.elapsed = end;
        debug_assert!(self.next_play_time >= start);
        cycle
    }

    fn run_cycle(
        &mut self,
        start: u64,
        models: &ModelSet,
        source: GenerationContext,
        settings: &CycleSettings,
        out: &mut Vec<MidiEvent>,
    ) -> Cycle {
        if models.primary_size() < MIN_MODEL_SIZE {
            return Cycle::Starved;
        }
        let onset = self.next_play_time;
        let audible = self.rng.gen::<f32>() < settings.play_probability;
        let draw = models.draw(settings.require_choices, source);

        let Some(ioi) = positive(&draw.ioi) else {
            tracing::debug!("Dropping cycle at sample {}: unusable IOI {}", onset, draw.ioi);
            return Cycle::Discarded;
        };

        let played = if audible {
            self.start_notes(onset, (onset - start) as usize, &draw, settings.channel, out)
        } else {
            0
        };

        let mut next = onset.saturating_add(ioi);
        if settings.sync_to_grid {
            if let Some(grid) = settings.grid {
                next = grid.next_boundary(next);
            }
        }
        self.next_play_time = next;

        if audible {
            Cycle::Played(played)
        } else {
            Cycle::Silent
        }
    }

    fn start_notes(
        &mut self,
        onset: u64,
        offset: usize,
        draw: &Draw,
        channel: u8,
        out: &mut Vec<MidiEvent>,
    ) -> usize {
        let Some(duration) = positive(&draw.duration) else {
            tracing::debug!("Skipping notes at sample {}: unusable duration {}", onset, draw.duration);
            return 0;
        };
        let mut notes = match draw.pitch.to_notes() {
            Ok(notes) => notes,
            Err(e) => {
                tracing::warn!("Skipping notes at sample {}: {}", onset, e);
                return 0;
            }
        };
        notes.sort_unstable();
        notes.dedup();

        let velocity = draw
            .velocity
            .to_int()
            .ok()
            .filter(|v| (1..=127).contains(v))
            .map_or(DEFAULT_VELOCITY, |v| v as u8);

        let target = draw
            .polyphony
            .to_int()
            .ok()
            .filter(|&p| p >= 1)
            .map(|p| p as usize);
        if let Some(target) = target.filter(|&target| notes.len() > target) {
            let mut chosen: Vec<u8> = notes.choose_multiple(&mut self.rng, target).copied().collect();
            chosen.sort_unstable();
            notes = chosen;
        }

        for &note in &notes {
            let slot = usize::from(note);
            if self.note_off_deadlines[slot] != 0 {
                out.push(MidiEvent::note_off(0, channel, note));
            }
            // an off already flushed later in this block would cut the new note
            for event in out.iter_mut() {
                if event.message == (Message::NoteOff { note }) && event.frame_offset > offset {
                    event.frame_offset = 0;
                }
            }
            out.push(MidiEvent::note_on(offset, channel, note, velocity));
            self.note_off_deadlines[slot] = onset.saturating_add(duration);
        }
        notes.len()
    }

    fn flush_deadlines(&mut self, start: u64, end: u64, channel: u8, out: &mut Vec<MidiEvent>) {
        for (note, deadline) in self.note_off_deadlines.iter_mut().enumerate() {
            if *deadline != 0 && *deadline < end {
                let offset = deadline.saturating_sub(start) as usize;
                out.push(MidiEvent::note_off(offset, channel, note as u8));
                *deadline = 0;
            }
        }
    }

    /// Silence everything: a note-off per sounding note, then All Notes Off
    /// on every channel. Returns the number of events written.
    pub fn panic(&mut self, channel: u8, out: &mut Vec<MidiEvent>) -> usize {
        let before = out.len();
        for (note, deadline) in self.note_off_deadlines.iter_mut().enumerate() {
            if *deadline != 0 {
                out.push(MidiEvent::note_off(0, channel, note as u8));
                *deadline = 0;
            }
        }
        for ch in 0..MIDI_CHANNELS {
            out.push(MidiEvent::all_notes_off(0, ch));
        }
        out.len() - before
    }

    /// Forget sounding notes and restart the cursor at the current position.
    pub fn reset(&mut self) {
        self.note_off_deadlines = [0; NOTE_COUNT];
        self.next_play_time = self.elapsed;
    }
}

/// Strictly positive integer value of a scalar token.
fn positive(token: &Token) -> Option<u64> {
    token.to_int().ok().filter(|&v| v > 0).map(|v| v as u64)
}
