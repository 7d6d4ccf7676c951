//! Error types for the MIDI layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),
}

impl From<midi_msg::ParseError> for Error {
    fn from(e: midi_msg::ParseError) -> Self {
        Error::MidiParse(format!("{e:?}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
