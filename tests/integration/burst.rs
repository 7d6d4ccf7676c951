//! Burst grouping integration tests
//!
//! Chords and controller sweeps grouped by inter-arrival time, both through
//! the detector directly and through an engine.

use crate::helpers::*;
use duet::midi::BurstDetector;
use duet::prelude::*;
use duet::{ChordDetector, ModelUpdate};

/// Test the canonical gap case: [0, 5, 400] with threshold 100.
#[test]
fn test_gap_finalizes_one_group() {
    let mut detector = BurstDetector::new(100);
    for t in [0u64, 5, 400] {
        detector.add(t, t);
    }
    assert_eq!(detector.take_ready().as_slice(), &[0, 5]);
    assert!(detector.take_ready().is_empty());
    assert_eq!(detector.pending(), &[400]);
}

/// Test that a group with no trailing gap is never delivered on its own.
#[test]
fn test_tight_group_waits_for_next_event() {
    let mut detector = BurstDetector::new(100);
    for t in [0u64, 5, 12] {
        detector.add(t, t);
        assert!(!detector.has_ready());
    }
    detector.add(500, 500);
    assert_eq!(detector.take_ready().as_slice(), &[0, 5, 12]);
}

/// Test chord and controller detectors keep separate clocks.
#[test]
fn test_notes_and_controllers_independent() {
    let mut detector = ChordDetector::with_thresholds(100, 50);
    detector.note_played(60, 100, 0);
    detector.controller_moved(1, 10, 1_000);
    // the controller at 1000 does not close the chord
    assert!(detector.take_ready_notes().is_empty());
    detector.note_played(64, 100, 1_001);
    assert_eq!(detector.take_ready_notes().len(), 1);
}

/// Test that a chord played into the engine trains one pitch-set token.
#[test]
fn test_engine_learns_chord_as_one_token() {
    let mut engine = test_engine();
    let input = [
        InputEvent::note_on(0, 0, 67, 90),
        InputEvent::note_on(3, 0, 60, 110),
        InputEvent::note_on(9, 0, 64, 100),
    ];
    engine.process_block(&input, TEST_BLOCK, None);
    idle(&mut engine, 8);
    let input = [InputEvent::note_on(engine.elapsed(), 0, 72, 100)];
    engine.process_block(&input, TEST_BLOCK, None);
    drain_updates(&mut engine);

    let models = engine.persistent_models();
    let pitch = models.get(Attribute::Pitch).snapshot();
    let chord = Token::from_notes(&[60, 64, 67]);
    assert_eq!(pitch.weight(&[], &chord), 1);

    let polyphony = models.get(Attribute::Polyphony).snapshot();
    assert_eq!(polyphony.weight(&[], &Token::from_int(3)), 1);
    let velocity = models.get(Attribute::Velocity).snapshot();
    assert_eq!(velocity.weight(&[], &Token::from_int(100)), 1);
}

/// Test that external updates share the same queue as live input.
#[test]
fn test_external_updates_are_applied() {
    let mut engine = test_engine();
    let sender = engine.update_sender();
    assert!(sender.send(ModelUpdate::Length { samples: 4_800 }));
    drain_updates(&mut engine);
    let durations = engine.persistent_models().get(Attribute::Duration).snapshot();
    assert_eq!(durations.weight(&[], &Token::from_int(4_800)), 1);
}
