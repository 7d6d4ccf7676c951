//! Symbolic tokens for observed values.
//!
//! A token is the immutable, order-independent text form of one observation:
//! a pitch set (`"60-64-67-"`), or a scalar such as a duration in samples
//! (`"11025"`). The token `"0"` is reserved for "no observation".

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Text of the reserved "no observation" token.
pub const SENTINEL: &str = "0";

/// Separator between the note numbers of a pitch-set token.
const NOTE_SEP: char = '-';

/// Characters the text codecs use as delimiters.
const RESERVED: &[char] = &['|', ',', '@'];

/// Immutable symbolic observation. Cloning is a reference-count bump.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(Arc<str>);

impl Token {
    /// Validates and wraps `text`.
    ///
    /// Empty text, whitespace and the codec delimiters (`|`, `,`, `@`) are
    /// rejected so every token survives both serialized forms.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty()
            || text
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || RESERVED.contains(&c))
        {
            return Err(Error::InvalidToken(text));
        }
        Ok(Self(Arc::from(text)))
    }

    #[inline]
    pub fn sentinel() -> Self {
        Self(Arc::from(SENTINEL))
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        &*self.0 == SENTINEL
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scalar token. Zero maps onto the sentinel, which is never a real value.
    pub fn from_int(value: i64) -> Self {
        Self(Arc::from(value.to_string()))
    }

    pub fn to_int(&self) -> Result<i64> {
        if self.is_sentinel() {
            return Err(Error::Sentinel);
        }
        self.0
            .parse::<i64>()
            .map_err(|_| Error::InvalidToken(self.0.to_string()))
    }

    /// Pitch-set token: note numbers sorted ascending, each followed by `-`.
    ///
    /// Duplicates are kept (it is a multiset). An empty set is the sentinel.
    pub fn from_notes(notes: &[u8]) -> Self {
        if notes.is_empty() {
            return Self::sentinel();
        }
        let mut sorted = notes.to_vec();
        sorted.sort_unstable();
        let mut text = String::with_capacity(sorted.len() * 4);
        for note in sorted {
            text.push_str(&note.to_string());
            text.push(NOTE_SEP);
        }
        Self(Arc::from(text))
    }

    /// Inverse of [`Token::from_notes`]. The sentinel decodes to no notes.
    pub fn to_notes(&self) -> Result<Vec<u8>> {
        if self.is_sentinel() {
            return Ok(Vec::new());
        }
        self.0
            .split(NOTE_SEP)
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<u8>() {
                Ok(note) if note < 128 => Ok(note),
                _ => Err(Error::InvalidToken(self.0.to_string())),
            })
            .collect()
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", &*self.0)
    }
}

impl TryFrom<String> for Token {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        Self::new(text)
    }
}

impl TryFrom<&str> for Token {
    type Error = Error;

    fn try_from(text: &str) -> Result<Self> {
        Self::new(text)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0.to_string()
    }
}
