//! Engine integration tests
//!
//! Learn a phrase, play it back and check the event stream for timing and
//! note pairing.

use crate::helpers::tolerances::{CC_EPSILON, RATE_TOLERANCE};
use crate::helpers::*;
use approx::{assert_abs_diff_eq, assert_relative_eq};
use duet::prelude::*;
use duet::midi::Message;
use duet::Cycle;

/// Test that a trained engine plays and never double-triggers.
#[test]
fn test_learn_then_play_back() {
    init_tracing();
    let mut engine = trained_engine(3);
    assert!(engine.persistent_models().primary_size() >= 2);

    engine.params().set_playing(true);
    let events = collect_output(&mut engine, 600);
    assert!(count_played(&events) > 10);
    assert_no_double_trigger(&events);

    // only learned pitches come back
    for (_, event) in events.iter().filter(|(_, e)| e.is_note_on()) {
        let Message::NoteOn { note, velocity } = event.message else {
            unreachable!()
        };
        assert!(PHRASE.contains(&note));
        assert_eq!(velocity, 96);
    }
}

/// Test that stopping releases every sounding note.
#[test]
fn test_stop_releases_everything() {
    let mut engine = trained_engine(3);
    engine.params().set_playing(true);
    let mut events = collect_output(&mut engine, 200);

    engine.params().set_playing(false);
    events.extend(collect_output(&mut engine, 2));
    let left = assert_no_double_trigger(&events);
    assert!(left.is_empty(), "stuck notes: {left:?}");
}

/// Test that onsets land on the tick grid when quantizing.
#[test]
fn test_quantized_onsets_on_grid() {
    let mut engine = test_builder()
        .tempo(120.0, 16)
        .quantize(true)
        .build()
        .unwrap();
    engine.params().set_playing(false);
    for _ in 0..3 {
        play_notes(&mut engine, &PHRASE);
    }
    drain_updates(&mut engine);

    engine.params().set_playing(true);
    let events = collect_output(&mut engine, 600);
    // 48 kHz, 120 BPM, sixteenths: 6000 samples per tick
    let onsets: Vec<u64> = events
        .iter()
        .filter(|(_, e)| e.is_note_on())
        .map(|(at, _)| *at)
        .collect();
    assert!(!onsets.is_empty());
    for at in onsets {
        assert_eq!(at % 6_000, 0, "onset at {at} is off the grid");
    }
}

/// Test that the host clock drives playback only while the host plays.
#[test]
fn test_host_transport_gates_playback() {
    let mut engine = test_builder().host_clock(true).build().unwrap();
    engine.params().set_playing(false);
    for _ in 0..3 {
        play_notes(&mut engine, &PHRASE);
    }
    drain_updates(&mut engine);
    engine.params().set_playing(true);

    let stopped = HostTransport {
        playing: false,
        ppq_position: Some(0.0),
        bpm: Some(120.0),
    };
    for _ in 0..100 {
        let out = engine.process_block(&[], TEST_BLOCK, Some(&stopped));
        assert!(out.iter().all(|e| !e.is_note_on()));
    }

    let beats_per_block = TEST_BLOCK as f64 * 120.0 / 60.0 / f64::from(TEST_SAMPLE_RATE);
    let mut ppq = 0.0;
    let mut played = 0;
    for _ in 0..600 {
        let host = HostTransport {
            playing: true,
            ppq_position: Some(ppq),
            bpm: Some(120.0),
        };
        played += engine
            .process_block(&[], TEST_BLOCK, Some(&host))
            .iter()
            .filter(|e| e.is_note_on())
            .count();
        ppq += beats_per_block;
    }
    assert!(played > 0);
}

/// Test that a zero play probability silences output but keeps time.
#[test]
fn test_zero_play_probability() {
    let mut engine = trained_engine(3);
    engine.params().set_play_probability(0.0);
    engine.params().set_playing(true);

    let mut silent = 0;
    for _ in 0..400 {
        let out = engine.process_block(&[], TEST_BLOCK, None);
        assert!(out.iter().all(|e| !e.is_note_on()));
        if engine.last_cycle() == Cycle::Silent {
            silent += 1;
        }
    }
    assert!(silent > 0);
}

/// Test that host MIDI with block offsets trains the engine.
#[test]
fn test_process_midi_block_learns() {
    let mut engine = test_engine();
    for note in PHRASE {
        let input = [MidiEvent::note_on(10, 0, note, 80), MidiEvent::note_off(400, 0, note)];
        engine.process_midi_block(&input, TEST_BLOCK, None);
        idle(&mut engine, NOTE_SPACING_BLOCKS - 1);
    }
    drain_updates(&mut engine);
    let durations = engine.persistent_models().get(Attribute::Duration).snapshot();
    assert!(durations.entries().all(|(_, token, _)| token.to_int().unwrap() == 390));
    assert!(durations.size() > 0);
}

/// Test that the output consumer sees the same events as the return value.
#[test]
fn test_output_consumer_matches_blocks() {
    let mut engine = trained_engine(3);
    let mut consumer = engine.output_consumer();
    engine.params().set_playing(true);
    let events = collect_output(&mut engine, 100);

    let mirrored: Vec<(u64, MidiEvent)> = consumer
        .drain_all()
        .into_iter()
        .map(|timed| (timed.sample(), timed.event))
        .collect();
    assert_eq!(mirrored, events);
}

/// Test that a controller on a channel the engine is not listening to still
/// sets the play probability, while notes on that channel are ignored.
#[test]
fn test_play_probability_cc_on_any_channel() {
    let mut engine = test_builder()
        .input_channel(1)
        .play_probability_cc(20)
        .build()
        .unwrap();
    engine.params().set_playing(false);

    let input = [
        InputEvent::control_change(0, 7, 20, 64),
        InputEvent::note_on(10, 7, 60, 100),
        InputEvent::note_off(200, 7, 60),
        // past the controller threshold: closes the burst
        InputEvent::control_change(10_000, 7, 1, 0),
    ];
    engine.process_block(&input, TEST_BLOCK, None);

    let probability = engine.params().snapshot().play_probability;
    assert_relative_eq!(probability, 64.0 / 127.0, epsilon = CC_EPSILON);
    drain_updates(&mut engine);
    assert_eq!(engine.persistent_models().get(Attribute::Duration).size(), 0);
}

/// Test that the share of audible cycles follows the play probability.
#[test]
fn test_play_rate_follows_probability() {
    let mut engine = trained_engine(3);
    engine.params().set_play_probability(0.5);
    engine.params().set_playing(true);

    let (mut played, mut silent) = (0u32, 0u32);
    for _ in 0..4_000 {
        engine.process_block(&[], TEST_BLOCK, None);
        match engine.last_cycle() {
            Cycle::Played(_) => played += 1,
            Cycle::Silent => silent += 1,
            _ => {}
        }
    }
    let total = played + silent;
    assert!(total > 200, "only {total} cycles were due");
    let rate = f64::from(played) / f64::from(total);
    assert_abs_diff_eq!(rate, 0.5, epsilon = RATE_TOLERANCE);
}
