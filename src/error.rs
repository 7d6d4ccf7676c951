//! Centralized error type for the duet umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] duet_core::Error),

    #[error("Model: {0}")]
    Model(#[from] duet_markov::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] duet_midi::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
