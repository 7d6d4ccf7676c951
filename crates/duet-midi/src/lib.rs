//! MIDI layer for duet.
//!
//! - **Events**: [`InputEvent`] (absolute sample time) and [`MidiEvent`] (block offset)
//! - **Burst detection**: [`ChordDetector`] groups chords and controller sweeps
//! - **Output**: lock-free [`output_channel`] for handing events to another thread

pub mod error;
pub use error::{Error, Result};

mod event;
pub use event::{EventKind, InputEvent, Message, MidiEvent, ALL_NOTES_OFF_CC};

mod burst;
pub use burst::{BurstDetector, ChordDetector, ControllerValue, Group, NoteOnset};

mod output;
pub use output::{
    output_channel, output_channel_with_capacity, OutputConsumer, OutputProducer, TimedEvent,
};
