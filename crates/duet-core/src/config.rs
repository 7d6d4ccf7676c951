//! Engine configuration.

use crate::{Error, Result};
use duet_markov::{GenerationContext, ManagerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;
pub const MAX_DIVISION: u32 = 64;

/// Whose history keys generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Continue from the engine's own output.
    #[default]
    Lead,
    /// Respond to the live input.
    Follow,
}

impl PlayMode {
    #[inline]
    pub fn generation_context(self) -> GenerationContext {
        match self {
            PlayMode::Lead => GenerationContext::UseOwnOutput,
            PlayMode::Follow => GenerationContext::UseLiveInput,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImproviserKind {
    /// One persistent model set.
    Markov,
    /// Persistent long-term set plus a short-term set for following.
    #[default]
    LeadFollow,
}

/// Configuration for the improvisation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Maximum Markov context order.
    pub max_order: usize,
    /// Generations remembered for feedback.
    pub chain_memory: usize,
    /// Note burst threshold in samples, `None` for `sample_rate / 40`.
    pub note_burst_threshold: Option<u64>,
    /// Controller burst threshold in samples, `None` for `sample_rate / 16`.
    pub controller_burst_threshold: Option<u64>,
    /// Same-order generations before the contexts reset (0 disables).
    pub max_same_order_repeats: usize,
    pub bpm: f64,
    /// Grid ticks per whole note (4 = quarter notes).
    pub division: u32,
    pub mode: PlayMode,
    pub quantize: bool,
    /// Follow the host transport instead of the internal tempo.
    pub host_clock: bool,
    /// 0 = omni, otherwise 1-16.
    pub input_channel: u8,
    /// 1-16.
    pub output_channel: u8,
    /// Chance that a due cycle actually plays.
    pub play_probability: f32,
    /// Controller mapped onto the play probability.
    pub play_probability_cc: Option<u8>,
    pub update_queue_capacity: usize,
    pub updates_per_block: usize,
    /// Longer inter-onset intervals are not trained.
    pub max_ioi_seconds: f64,
    pub require_choices: bool,
    pub improviser: ImproviserKind,
    /// The short-term model is cleared once more than this many note-on and
    /// note-off messages have been heard. 0 never clears it.
    pub short_term_reset_notes: usize,
    /// Fixed seed for every random draw, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            max_order: 4,
            chain_memory: 20,
            note_burst_threshold: None,
            controller_burst_threshold: None,
            max_same_order_repeats: 8,
            bpm: 120.0,
            division: 4,
            mode: PlayMode::Lead,
            quantize: false,
            host_clock: false,
            input_channel: 0,
            output_channel: 1,
            play_probability: 1.0,
            play_probability_cc: None,
            update_queue_capacity: 256,
            updates_per_block: 1,
            max_ioi_seconds: 3.0,
            require_choices: false,
            improviser: ImproviserKind::LeadFollow,
            short_term_reset_notes: 64,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_order == 0 || self.max_order > 16 {
            return Err(Error::InvalidConfig(format!(
                "max_order {} out of range (1-16)",
                self.max_order
            )));
        }
        validate_bpm(self.bpm)?;
        validate_division(self.division)?;
        if self.input_channel > 16 {
            return Err(Error::InvalidConfig(format!(
                "input_channel {} out of range (0-16)",
                self.input_channel
            )));
        }
        if !(1..=16).contains(&self.output_channel) {
            return Err(Error::InvalidConfig(format!(
                "output_channel {} out of range (1-16)",
                self.output_channel
            )));
        }
        if !(0.0..=1.0).contains(&self.play_probability) {
            return Err(Error::InvalidConfig(format!(
                "play_probability {} out of range (0-1)",
                self.play_probability
            )));
        }
        if self.play_probability_cc.is_some_and(|cc| cc > 127) {
            return Err(Error::InvalidConfig(
                "play_probability_cc must be 0-127".to_string(),
            ));
        }
        if self.update_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "update_queue_capacity must be at least 1".to_string(),
            ));
        }
        if !self.max_ioi_seconds.is_finite() || self.max_ioi_seconds <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max_ioi_seconds {} must be positive",
                self.max_ioi_seconds
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn note_burst_threshold(&self) -> u64 {
        self.note_burst_threshold
            .unwrap_or(u64::from(self.sample_rate / 40))
    }

    #[inline]
    pub fn controller_burst_threshold(&self) -> u64 {
        self.controller_burst_threshold
            .unwrap_or(u64::from(self.sample_rate / 16))
    }

    #[inline]
    pub fn max_ioi_samples(&self) -> u64 {
        (self.max_ioi_seconds * f64::from(self.sample_rate)) as u64
    }

    /// Per-attribute manager settings. `salt` decorrelates seeded managers.
    pub fn manager_config(&self, salt: u64) -> ManagerConfig {
        ManagerConfig {
            max_order: self.max_order,
            chain_memory: self.chain_memory,
            max_same_order_repeats: self.max_same_order_repeats,
            seed: self.seed.map(|seed| seed.wrapping_add(salt)),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

pub(crate) fn validate_bpm(bpm: f64) -> Result<()> {
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(Error::InvalidTempo(bpm));
    }
    Ok(())
}

pub(crate) fn validate_division(division: u32) -> Result<()> {
    if !(1..=MAX_DIVISION).contains(&division) {
        return Err(Error::InvalidDivision(division));
    }
    Ok(())
}
