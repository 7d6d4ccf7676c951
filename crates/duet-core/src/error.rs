//! Error types for duet-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be between 20.0 and 999.0 BPM")]
    InvalidTempo(f64),

    #[error("Invalid division: {0}. Must be between 1 and 64")]
    InvalidDivision(u32),

    #[error("Malformed model file: {0}")]
    MalformedModelFile(String),

    #[error("Model I/O busy: {0:?} in progress")]
    ModelIoBusy(crate::model_io::ModelIoState),

    #[error(transparent)]
    Model(#[from] duet_markov::Error),

    #[error(transparent)]
    Midi(#[from] duet_midi::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
