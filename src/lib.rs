//! # Duet - Real-time Generative MIDI Improviser
//!
//! Listens to live MIDI, learns variable-order Markov models of what was
//! played, and plays back sample-accurately in lead or follow mode.
//!
//! ## Architecture
//!
//! Duet is an umbrella crate that coordinates:
//! - **duet-markov** - Sequence model, model manager, text/binary persistence
//! - **duet-midi** - Event types, chord/controller burst detection, lock-free output
//! - **duet-core** - Learner, clock, scheduler, attribute models, engine
//!
//! ## Quick Start
//!
//! ```
//! use duet::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .sample_rate(48_000)
//!     .tempo(120.0, 8)
//!     .quantize(true)
//!     .build()?;
//!
//! // Once per audio block: live input in, generated events out
//! let input = [InputEvent::note_on(0, 0, 60, 100)];
//! for event in engine.process_block(&input, 512, None) {
//!     let _bytes = event.to_bytes();
//! }
//!
//! // From a control thread
//! engine.params().set_mode(PlayMode::Follow);
//! # Ok::<(), duet::Error>(())
//! ```

use std::path::Path;

/// Re-export of duet-core for direct access
pub use duet_core as core;
/// Re-export of duet-markov for direct access
pub use duet_markov as markov;
/// Re-export of duet-midi for direct access
pub use duet_midi as midi;

mod error;
pub use error::{Error, Result};

pub use duet_core::{
    Attribute, Cycle, Engine, EngineBuilder, EngineConfig, HostTransport, Improviser,
    ImproviserKind, ModelIo, ModelIoState, ModelSet, ModelUpdate, ParamSnapshot, PlayMode,
    SharedParams,
};
pub use duet_markov::{GenerationContext, ModelManager, SequenceModel, Token};
pub use duet_midi::{ChordDetector, InputEvent, Message, MidiEvent, OutputConsumer, TimedEvent};

/// Build an engine from a JSON config file, optionally loading saved models.
pub fn open(config_path: impl AsRef<Path>, models: Option<&Path>) -> Result<Engine> {
    let config_path = config_path.as_ref();
    let config = EngineConfig::load(config_path)?;
    let engine = Engine::new(config)?;
    tracing::debug!("opened engine from {}", config_path.display());
    if let Some(path) = models {
        engine.load_model(path)?;
    }
    Ok(engine)
}

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{Engine, EngineBuilder, EngineConfig};

    // Live control
    pub use crate::{HostTransport, PlayMode, SharedParams};

    // Events
    pub use crate::{InputEvent, MidiEvent};

    // Models
    pub use crate::{Attribute, ModelSet, Token};
}
