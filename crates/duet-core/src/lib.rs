//! Real-time improvisation engine.
//!
//! Live MIDI is grouped into chords, turned into model updates and learned
//! by five attribute models (pitch, duration, velocity, inter-onset
//! interval, polyphony). A sample-accurate scheduler draws from those
//! models to play back, locked to an internal tempo or the host transport.
//!
//! # Modules
//!
//! - [`Engine`] / [`EngineBuilder`]: per-block entry point
//! - [`SharedParams`]: lock-free live parameters
//! - [`Clock`] / [`Grid`]: tick grid from tempo or host ppq
//! - [`Scheduler`]: play cursor, note-off deadlines, polyphony
//! - [`ModelSet`]: the attribute models and their container files
//! - [`ModelIo`]: background model load/save
//! - [`Improviser`]: `Markov` or `LeadFollow`

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::{EngineConfig, ImproviserKind, PlayMode, MAX_BPM, MAX_DIVISION, MIN_BPM};

mod params;
pub use params::{ParamSnapshot, SharedParams};

mod clock;
pub use clock::{samples_per_tick, Clock, ClockBlock, Grid, HostTransport};

mod quantize;
pub use quantize::quantize;

mod update_queue;
pub use update_queue::{update_queue, ModelUpdate, UpdateReceiver, UpdateSender};

mod learner;
pub use learner::Learner;

mod models;
pub use models::{
    compress_model_data, decompress_model_data, should_compress, Attribute, Draw, ModelFormat,
    ModelSet,
};

mod model_io;
pub use model_io::{ModelIo, ModelIoOutcome, ModelIoState};

mod improviser;
pub use improviser::{Improvise, Improviser, LeadFollowImproviser, MarkovImproviser};

mod scheduler;
pub use scheduler::{Cycle, CycleSettings, Scheduler};

mod engine;
pub use engine::{Engine, EngineBuilder};

pub use duet_markov::{GenerationContext, Token};
pub use duet_midi::{InputEvent, MidiEvent, OutputConsumer, TimedEvent};
