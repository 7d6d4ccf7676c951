//! Live parameters shared between a control thread and the audio thread.
//!
//! Setters may be called from any thread; the engine reads a
//! [`ParamSnapshot`] once at the top of each block.

use crate::config::{validate_bpm, validate_division, EngineConfig, PlayMode};
use crate::Result;
use atomic_float::{AtomicF32, AtomicF64};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug)]
pub struct SharedParams {
    bpm: AtomicF64,
    division: AtomicU32,
    quantize: AtomicBool,
    host_clock: AtomicBool,
    playing: AtomicBool,
    learning: AtomicBool,
    follow: AtomicBool,
    play_probability: AtomicF32,
    panic_requested: AtomicBool,
}

/// Values read once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub bpm: f64,
    pub division: u32,
    pub quantize: bool,
    pub host_clock: bool,
    pub playing: bool,
    pub learning: bool,
    pub mode: PlayMode,
    pub play_probability: f32,
}

impl ParamSnapshot {
    /// Generated onsets snap to the grid when quantizing or host-synced.
    #[inline]
    pub fn sync_to_grid(&self) -> bool {
        self.quantize || self.host_clock
    }
}

impl SharedParams {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bpm: AtomicF64::new(config.bpm),
            division: AtomicU32::new(config.division),
            quantize: AtomicBool::new(config.quantize),
            host_clock: AtomicBool::new(config.host_clock),
            playing: AtomicBool::new(true),
            learning: AtomicBool::new(true),
            follow: AtomicBool::new(config.mode == PlayMode::Follow),
            play_probability: AtomicF32::new(config.play_probability),
            panic_requested: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            bpm: self.bpm.load(Ordering::Acquire),
            division: self.division.load(Ordering::Acquire),
            quantize: self.quantize.load(Ordering::Acquire),
            host_clock: self.host_clock.load(Ordering::Acquire),
            playing: self.playing.load(Ordering::Acquire),
            learning: self.learning.load(Ordering::Acquire),
            mode: self.mode(),
            play_probability: self.play_probability.load(Ordering::Acquire),
        }
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        validate_bpm(bpm)?;
        self.bpm.store(bpm, Ordering::Release);
        Ok(())
    }

    pub fn set_division(&self, division: u32) -> Result<()> {
        validate_division(division)?;
        self.division.store(division, Ordering::Release);
        Ok(())
    }

    pub fn set_quantize(&self, enabled: bool) {
        self.quantize.store(enabled, Ordering::Release);
    }

    pub fn set_host_clock(&self, enabled: bool) {
        self.host_clock.store(enabled, Ordering::Release);
    }

    /// Stopping playback silences whatever is still sounding.
    pub fn set_playing(&self, playing: bool) {
        let was_playing = self.playing.swap(playing, Ordering::AcqRel);
        if was_playing && !playing {
            self.request_panic();
        }
    }

    pub fn set_learning(&self, learning: bool) {
        self.learning.store(learning, Ordering::Release);
    }

    /// Switching mode silences whatever is still sounding.
    pub fn set_mode(&self, mode: PlayMode) {
        let follow = mode == PlayMode::Follow;
        if self.follow.swap(follow, Ordering::AcqRel) != follow {
            tracing::debug!("Play mode switched to {:?}", mode);
            self.request_panic();
        }
    }

    pub fn mode(&self) -> PlayMode {
        if self.follow.load(Ordering::Acquire) {
            PlayMode::Follow
        } else {
            PlayMode::Lead
        }
    }

    /// Clamped to 0-1; NaN is ignored.
    pub fn set_play_probability(&self, probability: f32) {
        if probability.is_nan() {
            return;
        }
        self.play_probability
            .store(probability.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn request_panic(&self) {
        self.panic_requested.store(true, Ordering::Release);
    }

    /// Consume a pending panic request.
    pub fn take_panic(&self) -> bool {
        self.panic_requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_config() {
        let config = EngineConfig {
            bpm: 90.0,
            division: 8,
            mode: PlayMode::Follow,
            ..Default::default()
        };
        let snapshot = SharedParams::new(&config).snapshot();
        assert_eq!(snapshot.bpm, 90.0);
        assert_eq!(snapshot.division, 8);
        assert_eq!(snapshot.mode, PlayMode::Follow);
        assert!(snapshot.playing);
        assert!(!snapshot.sync_to_grid());
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        let params = SharedParams::default();
        assert!(params.set_bpm(5.0).is_err());
        assert!(params.set_bpm(f64::INFINITY).is_err());
        assert!(params.set_division(0).is_err());
        assert_eq!(params.snapshot().bpm, 120.0);
        params.set_bpm(140.0).unwrap();
        assert_eq!(params.snapshot().bpm, 140.0);
    }

    #[test]
    fn test_mode_switch_requests_panic_once() {
        let params = SharedParams::default();
        params.set_mode(PlayMode::Lead);
        assert!(!params.take_panic());

        params.set_mode(PlayMode::Follow);
        assert!(params.take_panic());
        assert!(!params.take_panic());
    }

    #[test]
    fn test_stop_requests_panic() {
        let params = SharedParams::default();
        params.set_playing(true);
        assert!(!params.take_panic());
        params.set_playing(false);
        assert!(params.take_panic());
        assert!(!params.snapshot().playing);
    }

    #[test]
    fn test_play_probability_clamped() {
        let params = SharedParams::default();
        params.set_play_probability(2.0);
        assert_eq!(params.snapshot().play_probability, 1.0);
        params.set_play_probability(-1.0);
        assert_eq!(params.snapshot().play_probability, 0.0);
        params.set_play_probability(f32::NAN);
        assert_eq!(params.snapshot().play_probability, 0.0);
    }
}
