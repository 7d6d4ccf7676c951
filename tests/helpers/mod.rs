//! Test helpers and fixtures for duet integration tests
//!
//! Engines are driven by hand one block at a time, with seeded randomness,
//! so every run sees the same sequence of generated events.

#![allow(dead_code)]

pub mod tolerances;

use duet::prelude::*;
use duet::midi::Message;
use duet::{Cycle, ImproviserKind};

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: u32 = 48_000;

/// Standard buffer size for deterministic testing
pub const TEST_BLOCK: usize = 512;

/// Blocks between phrase notes: 2048 samples, well past the chord threshold.
pub const NOTE_SPACING_BLOCKS: usize = 4;

pub const PHRASE: [u8; 6] = [60, 62, 64, 65, 67, 64];

/// Install a fmt subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_builder() -> EngineBuilder {
    Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .improviser(ImproviserKind::Markov)
        .seed(42)
}

/// Seeded single-model-set engine, not yet playing.
pub fn test_engine() -> Engine {
    let engine = test_builder().build().expect("Failed to create test engine");
    engine.params().set_playing(false);
    engine
}

/// Play `notes` one at a time, each held for 300 samples.
pub fn play_notes(engine: &mut Engine, notes: &[u8]) {
    for &note in notes {
        let start = engine.elapsed();
        let input = [
            InputEvent::note_on(start, 0, note, 96),
            InputEvent::note_off(start + 300, 0, note),
        ];
        engine.process_block(&input, TEST_BLOCK, None);
        idle(engine, NOTE_SPACING_BLOCKS - 1);
    }
}

/// Process `blocks` empty blocks, discarding output.
pub fn idle(engine: &mut Engine, blocks: usize) {
    for _ in 0..blocks {
        engine.process_block(&[], TEST_BLOCK, None);
    }
}

/// Apply every queued update.
pub fn drain_updates(engine: &mut Engine) {
    while engine.pending_updates() > 0 {
        engine.process_block(&[], TEST_BLOCK, None);
    }
}

/// Feed `repeats` copies of [`PHRASE`] and apply all updates.
pub fn trained_engine(repeats: usize) -> Engine {
    let mut engine = test_engine();
    for _ in 0..repeats {
        play_notes(&mut engine, &PHRASE);
    }
    engine.flush_input();
    drain_updates(&mut engine);
    engine
}

/// Output of `blocks` blocks as (absolute sample, event), in order.
pub fn collect_output(engine: &mut Engine, blocks: usize) -> Vec<(u64, MidiEvent)> {
    let mut events = Vec::new();
    for _ in 0..blocks {
        let start = engine.elapsed();
        for event in engine.process_block(&[], TEST_BLOCK, None) {
            events.push((start + event.frame_offset as u64, *event));
        }
    }
    events
}

/// Walk the output and fail on a note-on for a note that is still sounding.
/// Returns the notes left sounding at the end.
pub fn assert_no_double_trigger(events: &[(u64, MidiEvent)]) -> Vec<u8> {
    let mut sounding = [false; 128];
    for (at, event) in events {
        match event.message {
            Message::NoteOn { note, .. } => {
                assert!(
                    !sounding[note as usize],
                    "note {note} retriggered at sample {at} without a release"
                );
                sounding[note as usize] = true;
            }
            Message::NoteOff { note } => sounding[note as usize] = false,
            Message::Controller { .. } => {}
        }
    }
    (0..128u8).filter(|&n| sounding[n as usize]).collect()
}

pub fn count_played(events: &[(u64, MidiEvent)]) -> usize {
    events.iter().filter(|(_, e)| e.is_note_on()).count()
}

pub fn is_played(cycle: Cycle) -> bool {
    matches!(cycle, Cycle::Played(n) if n > 0)
}
