//! Model persistence integration tests
//!
//! Save a trained engine's models in both container formats, load them into
//! a fresh engine, and check that bad files leave the models alone.

use crate::helpers::*;
use duet::core::ModelIoState;
use duet::prelude::*;
use duet::SequenceModel;
use proptest::prelude::*;

fn snapshots(models: &ModelSet) -> Vec<SequenceModel> {
    models.iter().map(|(_, manager)| manager.snapshot()).collect()
}

/// Test that both file formats round-trip every attribute model.
#[test]
fn test_model_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = trained_engine(2);
    let expected = snapshots(&source.persistent_models());
    assert!(expected.iter().all(|model| model.size() > 0));

    for name in ["session.txt", "session.bin", "session.txt.gz", "session.bin.gz"] {
        let path = dir.path().join(name);
        source.save_model(&path).unwrap();

        let target = test_engine();
        target.load_model(&path).unwrap();
        assert_eq!(snapshots(&target.persistent_models()), expected, "{name}");
    }
}

/// Test the text container's separators and segment order.
#[test]
fn test_text_container_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.txt");
    let engine = trained_engine(1);
    engine.save_model(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let segments: Vec<&str> = text.split('@').collect();
    assert_eq!(segments.len(), 6);
    assert!(segments[0].is_empty());
    for segment in &segments[1..] {
        assert!(segment.starts_with("duet-sequence-model v1\n"));
    }
    // pitch segment holds pitch-set tokens
    assert!(segments[1].contains("60-"));
}

/// Test the binary container's count and length prefixes.
#[test]
fn test_binary_container_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin");
    let engine = trained_engine(1);
    engine.save_model(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let read_u32 = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
    assert_eq!(read_u32(0), Attribute::ALL.len());

    let mut at = 4;
    for _ in Attribute::ALL {
        let len = read_u32(at);
        at += 4 + len;
    }
    assert_eq!(at, bytes.len());
}

/// Test that a corrupt or missing file leaves the loaded models untouched.
#[test]
fn test_bad_file_keeps_models() {
    let dir = tempfile::tempdir().unwrap();
    let engine = trained_engine(2);
    let before = snapshots(&engine.persistent_models());

    let truncated = dir.path().join("truncated.bin");
    let good = dir.path().join("good.bin");
    engine.save_model(&good).unwrap();
    let bytes = std::fs::read(&good).unwrap();
    std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();
    assert!(engine.load_model(&truncated).is_err());

    let garbage = dir.path().join("garbage.txt");
    std::fs::write(&garbage, "@not a model").unwrap();
    assert!(engine.load_model(&garbage).is_err());

    assert!(engine.load_model(dir.path().join("missing.txt")).is_err());
    assert_eq!(snapshots(&engine.persistent_models()), before);
}

/// Test opening an engine from a config file plus saved models.
#[test]
fn test_open_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("duet.json");
    let model_path = dir.path().join("session.bin");

    let source = trained_engine(2);
    source.config().save(&config_path).unwrap();
    source.save_model(&model_path).unwrap();

    let engine = duet::open(&config_path, Some(&model_path)).unwrap();
    assert_eq!(engine.config(), source.config());
    assert_eq!(
        snapshots(&engine.persistent_models()),
        snapshots(&source.persistent_models())
    );

    std::fs::write(&config_path, r#"{ "bpm": 5000.0 }"#).unwrap();
    assert!(matches!(
        duet::open(&config_path, None),
        Err(duet::Error::Core(duet::core::Error::InvalidTempo(_)))
    ));
}

/// Test that loading from another thread swaps models under the engine.
#[test]
fn test_background_load_swaps_models() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin");
    let source = trained_engine(2);
    source.save_model(&path).unwrap();

    let mut engine = test_engine();
    let models = engine.persistent_models();
    let handle = std::thread::spawn(move || models.load(&path));
    handle.join().unwrap().unwrap();

    assert!(engine.persistent_models().primary_size() >= 2);
    engine.params().set_playing(true);
    let events = collect_output(&mut engine, 200);
    assert!(count_played(&events) > 0);
}

/// Test the engine's own background load and its busy flag.
#[test]
fn test_engine_background_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin.gz");
    let source = trained_engine(2);
    source.save_model(&path).unwrap();

    let mut engine = test_engine();
    engine.load_model_in_background(&path).unwrap();
    // the audio side keeps running while the worker loads
    idle(&mut engine, 4);
    let outcome = engine.model_io().wait().unwrap();
    assert_eq!(outcome.stage, ModelIoState::Loading);
    assert!(outcome.result.is_ok());
    assert!(!engine.model_io().is_busy());
    assert_eq!(
        snapshots(&engine.persistent_models()),
        snapshots(&source.persistent_models())
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any learned phrase survives every file format.
    #[test]
    fn test_any_phrase_survives_save_and_load(
        phrase in prop::collection::vec(36u8..96, 2..10)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut source = test_engine();
        play_notes(&mut source, &phrase);
        source.flush_input();
        drain_updates(&mut source);
        let expected = snapshots(&source.persistent_models());
        prop_assert!(source.persistent_models().primary_size() > 0);

        for name in ["p.txt", "p.bin", "p.bin.gz"] {
            let path = dir.path().join(name);
            source.save_model(&path).unwrap();
            let target = test_engine();
            target.load_model(&path).unwrap();
            prop_assert_eq!(snapshots(&target.persistent_models()), expected.clone());
        }
    }
}
