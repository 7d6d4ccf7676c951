//! The five attribute models and their container files.
//!
//! Container formats, segments in [`Attribute::ALL`] order:
//!
//! - text: `'@'` followed by the segment's text, for each segment
//! - binary: `u32` LE segment count, then per segment a `u32` LE length
//!   and that many bytes
//!
//! A trailing `.gz` gzip-wraps either container; the extension before it
//! picks the format (`session.bin.gz`).
//!
//! Loading parses every segment before any model is touched, then swaps
//! each model in under its own manager's lock.

use crate::config::EngineConfig;
use crate::update_queue::ModelUpdate;
use crate::{Error, Result};
use duet_markov::{GenerationContext, ModelManager, SequenceModel, Token};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

const TEXT_SEPARATOR: char = '@';
const BINARY_EXTENSION: &str = "bin";
const GZIP_EXTENSION: &str = "gz";

/// One independently modelled property of the generated notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Pitch,
    Duration,
    Velocity,
    Ioi,
    Polyphony,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Pitch,
        Attribute::Duration,
        Attribute::Velocity,
        Attribute::Ioi,
        Attribute::Polyphony,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// On-disk container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Text,
    Binary,
}

impl ModelFormat {
    /// `.bin` is binary, anything else text. A `.gz` suffix is looked through.
    pub fn from_path(path: &Path) -> Self {
        let inner = if should_compress(path) {
            path.file_stem().map(Path::new)
        } else {
            Some(path)
        };
        match inner.and_then(Path::extension).and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(BINARY_EXTENSION) => ModelFormat::Binary,
            _ => ModelFormat::Text,
        }
    }
}

/// True for paths ending in `.gz`.
pub fn should_compress(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(GZIP_EXTENSION))
}

pub fn compress_model_data(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn decompress_model_data(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| Error::MalformedModelFile(format!("bad gzip stream: {e}")))?;
    Ok(out)
}

/// Tokens drawn for one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub pitch: Token,
    pub duration: Token,
    pub velocity: Token,
    pub ioi: Token,
    pub polyphony: Token,
}

/// Pitch, duration, velocity, inter-onset interval and polyphony models.
#[derive(Debug)]
pub struct ModelSet {
    models: [ModelManager; 5],
    max_order: usize,
}

impl ModelSet {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            models: Attribute::ALL.map(|attr| ModelManager::new(config.manager_config(attr as u64))),
            max_order: config.max_order,
        }
    }

    /// Longest context a loaded model may use.
    #[inline]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    #[inline]
    pub fn get(&self, attribute: Attribute) -> &ModelManager {
        &self.models[attribute.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &ModelManager)> {
        Attribute::ALL.into_iter().zip(self.models.iter())
    }

    /// Size of the pitch model, which gates generation.
    #[inline]
    pub fn primary_size(&self) -> usize {
        self.get(Attribute::Pitch).size()
    }

    pub fn apply(&self, update: &ModelUpdate) {
        match update {
            ModelUpdate::Onset {
                notes,
                velocity,
                polyphony,
                ioi,
            } => {
                if notes.is_empty() {
                    return;
                }
                self.get(Attribute::Pitch).put_event(Token::from_notes(notes));
                self.get(Attribute::Velocity)
                    .put_event(Token::from_int(i64::from(*velocity)));
                self.get(Attribute::Polyphony)
                    .put_event(Token::from_int(*polyphony as i64));
                if let Some(ioi) = ioi {
                    self.get(Attribute::Ioi).put_event(Token::from_int(*ioi as i64));
                }
            }
            ModelUpdate::Length { samples } => {
                if *samples > 0 {
                    self.get(Attribute::Duration)
                        .put_event(Token::from_int(*samples as i64));
                }
            }
        }
    }

    /// Draw one token per attribute, all keyed by the same context mode.
    pub fn draw(&self, require_choices: bool, source: GenerationContext) -> Draw {
        let next = |attribute| self.get(attribute).get_event(require_choices, source);
        Draw {
            pitch: next(Attribute::Pitch),
            duration: next(Attribute::Duration),
            velocity: next(Attribute::Velocity),
            ioi: next(Attribute::Ioi),
            polyphony: next(Attribute::Polyphony),
        }
    }

    pub fn give_feedback(&self, positive: bool) {
        for model in &self.models {
            if positive {
                model.give_positive_feedback();
            } else {
                model.give_negative_feedback();
            }
        }
    }

    pub fn reset(&self) {
        for model in &self.models {
            model.reset();
        }
    }

    pub fn reset_contexts(&self) {
        for model in &self.models {
            model.reset_contexts();
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for model in &self.models {
            out.push(TEXT_SEPARATOR);
            out.push_str(&model.to_text());
        }
        out
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.models.len() as u32).to_le_bytes());
        for model in &self.models {
            let segment = model.to_binary()?;
            let len = u32::try_from(segment.len())
                .map_err(|_| Error::MalformedModelFile("segment larger than 4 GiB".into()))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&segment);
        }
        Ok(out)
    }

    /// Replace every model from a text container; nothing changes on error.
    pub fn load_text(&self, text: &str) -> Result<()> {
        let body = text
            .strip_prefix(TEXT_SEPARATOR)
            .ok_or_else(|| Error::MalformedModelFile("missing leading separator".into()))?;
        let segments: Vec<&str> = body.split(TEXT_SEPARATOR).collect();
        self.check_count(segments.len())?;
        let parsed = segments
            .into_iter()
            .map(SequenceModel::from_text)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.check_orders(&parsed)?;
        self.install_all(parsed);
        Ok(())
    }

    /// Replace every model from a binary container; nothing changes on error.
    pub fn load_binary(&self, bytes: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_u32()? as usize;
        self.check_count(count)?;
        let mut parsed = Vec::with_capacity(count);
        for _ in 0..count {
            let len = reader.read_u32()? as usize;
            parsed.push(SequenceModel::from_binary(reader.read_bytes(len)?)?);
        }
        if reader.remaining() != 0 {
            return Err(Error::MalformedModelFile(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        self.check_orders(&parsed)?;
        self.install_all(parsed);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = match ModelFormat::from_path(path) {
            ModelFormat::Text => self.to_text().into_bytes(),
            ModelFormat::Binary => self.to_binary()?,
        };
        let data = if should_compress(path) {
            compress_model_data(&data)?
        } else {
            data
        };
        std::fs::write(path, &data)?;
        tracing::info!("Saved models to {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let result = self.read_file(path);
        match &result {
            Ok(()) => tracing::info!("Loaded models from {}", path.display()),
            Err(e) => tracing::warn!("Failed to load models from {}: {}", path.display(), e),
        }
        result
    }

    fn read_file(&self, path: &Path) -> Result<()> {
        let mut data = std::fs::read(path)?;
        if should_compress(path) {
            data = decompress_model_data(&data)?;
        }
        match ModelFormat::from_path(path) {
            ModelFormat::Text => {
                let text = String::from_utf8(data)
                    .map_err(|_| Error::MalformedModelFile("text container is not UTF-8".into()))?;
                self.load_text(&text)
            }
            ModelFormat::Binary => self.load_binary(&data),
        }
    }

    fn check_orders(&self, parsed: &[SequenceModel]) -> Result<()> {
        match parsed.iter().map(SequenceModel::max_order).max() {
            Some(order) if order > self.max_order => Err(Error::MalformedModelFile(format!(
                "model order {} exceeds configured max_order {}",
                order, self.max_order
            ))),
            _ => Ok(()),
        }
    }

    fn check_count(&self, count: usize) -> Result<()> {
        if count != self.models.len() {
            return Err(Error::MalformedModelFile(format!(
                "expected {} segments, found {}",
                self.models.len(),
                count
            )));
        }
        Ok(())
    }

    fn install_all(&self, parsed: Vec<SequenceModel>) {
        for (model, image) in self.models.iter().zip(parsed) {
            model.install(image);
        }
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let head = self.read_bytes(4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(head);
        Ok(u32::from_le_bytes(word))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(Error::MalformedModelFile(format!(
                "truncated: needed {} bytes, {} left",
                len,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }
}
