//! Error types for the sequence model.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid token: {0:?}")]
    InvalidToken(String),

    #[error("Sentinel token carries no value")]
    Sentinel,

    #[error("Malformed model text at line {line}: {reason}")]
    MalformedText { line: usize, reason: String },

    #[error("Malformed binary model: {0}")]
    MalformedBinary(String),

    #[error("Corrupt weight table for context [{0}]")]
    CorruptWeights(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MalformedBinary(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
