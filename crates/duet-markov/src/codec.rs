//! Text and binary serialization of a [`SequenceModel`].
//!
//! Text form, one mapping per line, entries in canonical (sorted) order:
//!
//! ```text
//! duet-sequence-model v1
//! max_order 4
//! 60-64-,67-|62-|3
//! |62-|5
//! ```
//!
//! Each mapping line is `context|observation|weight` where the context is
//! the comma-joined suffix (empty for order 0).
//!
//! Binary form is a bincode image with a magic number and version. Both
//! decoders validate the whole image before returning, so a failed decode
//! never touches the caller's model.

use crate::sequence::{context_label, Observations};
use crate::{Error, Result, SequenceModel, Token};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

const TEXT_HEADER: &str = "duet-sequence-model v1";
const MAX_ORDER_KEY: &str = "max_order";

const BINARY_MAGIC: [u8; 4] = *b"DSQM";
const BINARY_VERSION: u16 = 1;

/// Upper bound on a decoded binary image.
const BINARY_LIMIT: u64 = 256 * 1024 * 1024;

/// Sanity bound on `max_order` read from untrusted input.
const MAX_DECODED_ORDER: usize = 64;

#[derive(Serialize, Deserialize)]
struct BinaryImage {
    magic: [u8; 4],
    version: u16,
    max_order: u32,
    table: Vec<(Vec<Token>, Vec<(Token, u32)>)>,
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_limit(BINARY_LIMIT)
}

impl SequenceModel {
    /// Human-diffable text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(TEXT_HEADER);
        out.push('\n');
        let _ = writeln!(out, "{MAX_ORDER_KEY} {}", self.max_order);
        for (context, observation, weight) in self.entries() {
            let _ = writeln!(out, "{}|{}|{}", context_label(context), observation, weight);
        }
        out
    }

    /// Parse a text image into a new model.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

        match lines.next() {
            Some((_, line)) if line.trim_end() == TEXT_HEADER => {}
            Some((line, _)) => return Err(malformed(line, "missing header")),
            None => return Err(malformed(1, "empty input")),
        }

        let max_order = match lines.next() {
            Some((line, text)) => parse_max_order(line, text.trim_end())?,
            None => return Err(malformed(2, "missing max_order")),
        };

        let mut model = SequenceModel::new(max_order);
        for (line, text) in lines {
            let text = text.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }
            let mut fields = text.split('|');
            let (Some(context), Some(observation), Some(weight), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed(line, "expected context|observation|weight"));
            };

            let context = if context.is_empty() {
                Vec::new()
            } else {
                context
                    .split(',')
                    .map(Token::new)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| malformed(line, &e.to_string()))?
            };
            let observation = Token::new(observation).map_err(|e| malformed(line, &e.to_string()))?;
            let weight: u32 = weight
                .parse()
                .map_err(|_| malformed(line, "weight is not an unsigned integer"))?;

            check_entry(&model, &context, &observation, weight).map_err(|r| malformed(line, r))?;

            let slot = model
                .table
                .entry(context)
                .or_default()
                .entry(observation)
                .or_insert(0);
            *slot = slot.saturating_add(weight);
        }
        Ok(model)
    }

    /// Compact binary form.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let image = BinaryImage {
            magic: BINARY_MAGIC,
            version: BINARY_VERSION,
            max_order: self.max_order as u32,
            table: self
                .table
                .iter()
                .map(|(context, observations)| {
                    (
                        context.clone(),
                        observations
                            .iter()
                            .map(|(token, &weight)| (token.clone(), weight))
                            .collect(),
                    )
                })
                .collect(),
        };
        Ok(bincode_options().serialize(&image)?)
    }

    /// Parse a binary image into a new model.
    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        let image: BinaryImage = bincode_options().deserialize(bytes)?;
        if image.magic != BINARY_MAGIC {
            return Err(Error::MalformedBinary("bad magic".into()));
        }
        if image.version != BINARY_VERSION {
            return Err(Error::MalformedBinary(format!(
                "unsupported version {}",
                image.version
            )));
        }
        let max_order = image.max_order as usize;
        if max_order > MAX_DECODED_ORDER {
            return Err(Error::MalformedBinary(format!(
                "max_order {max_order} out of range"
            )));
        }

        let mut model = SequenceModel::new(max_order);
        for (context, observations) in image.table {
            let mut decoded = Observations::new();
            for (observation, weight) in observations {
                check_entry(&model, &context, &observation, weight)
                    .map_err(|r| Error::MalformedBinary(r.to_string()))?;
                if decoded.insert(observation, weight).is_some() {
                    return Err(Error::MalformedBinary("duplicate observation".into()));
                }
            }
            if decoded.is_empty() {
                continue;
            }
            if model.table.insert(context, decoded).is_some() {
                return Err(Error::MalformedBinary("duplicate context".into()));
            }
        }
        Ok(model)
    }

    /// Replace this model with the decoded text image; untouched on error.
    pub fn deserialize_text(&mut self, text: &str) -> Result<()> {
        *self = Self::from_text(text)?;
        Ok(())
    }

    /// Replace this model with the decoded binary image; untouched on error.
    pub fn deserialize_binary(&mut self, bytes: &[u8]) -> Result<()> {
        *self = Self::from_binary(bytes)?;
        Ok(())
    }
}

fn parse_max_order(line: usize, text: &str) -> Result<usize> {
    let value = text
        .strip_prefix(MAX_ORDER_KEY)
        .map(str::trim)
        .ok_or_else(|| malformed(line, "missing max_order"))?;
    let order: usize = value
        .parse()
        .map_err(|_| malformed(line, "max_order is not an unsigned integer"))?;
    if order > MAX_DECODED_ORDER {
        return Err(malformed(line, "max_order out of range"));
    }
    Ok(order)
}

fn check_entry(
    model: &SequenceModel,
    context: &[Token],
    observation: &Token,
    weight: u32,
) -> std::result::Result<(), &'static str> {
    if weight == 0 {
        return Err("zero weight");
    }
    if observation.is_sentinel() {
        return Err("sentinel observation");
    }
    if context.len() > model.max_order {
        return Err("context longer than max_order");
    }
    Ok(())
}

fn malformed(line: usize, reason: &str) -> Error {
    Error::MalformedText {
        line,
        reason: reason.to_string(),
    }
}
