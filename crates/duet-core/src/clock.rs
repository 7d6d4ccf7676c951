//! Tick grid from an internal tempo or the host transport.
//!
//! Each block the clock produces a [`Grid`]: a tick position and interval
//! valid for that block. The interval is recomputed from the current tempo
//! and division every block, so retuning never needs a restart.
//!
//! - Internal: an accumulator of samples since the last tick. Crossing the
//!   interval subtracts it (the remainder carries, so there is no drift).
//! - Host: the next grid-aligned ppq boundary is converted to an absolute
//!   sample. Transport start and position jumps are reported as a
//!   realignment so the scheduler can move its cursor to the next tick.

use crate::params::ParamSnapshot;

/// Beats of ppq discontinuity treated as a position jump.
const JUMP_TOLERANCE_BEATS: f64 = 1.0 / 64.0;

/// Slack for float error when snapping to a tick.
const GRID_EPSILON: f64 = 1e-6;

/// Transport state reported by the host for one block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostTransport {
    pub playing: bool,
    /// Quarter-note position at the first sample of the block.
    pub ppq_position: Option<f64>,
    pub bpm: Option<f64>,
}

/// Samples per grid tick, `None` unless finite and positive.
pub fn samples_per_tick(sample_rate: f64, bpm: f64, division: u32) -> Option<f64> {
    let interval = sample_rate * 60.0 / bpm * 4.0 / f64::from(division);
    (interval.is_finite() && interval > 0.0).then_some(interval)
}

/// Tick positions `anchor + k * interval` for integer `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    anchor: f64,
    interval: f64,
}

impl Grid {
    /// `None` for a non-finite or non-positive interval.
    pub fn new(anchor: f64, interval: f64) -> Option<Self> {
        (anchor.is_finite() && interval.is_finite() && interval > 0.0)
            .then_some(Self { anchor, interval })
    }

    #[inline]
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Interval rounded to whole samples (at least 1), for quantization.
    #[inline]
    pub fn quantum(&self) -> u64 {
        (self.interval.round() as u64).max(1)
    }

    /// First tick at or after `at`. Never earlier than `at`.
    pub fn next_boundary(&self, at: u64) -> u64 {
        let steps = ((at as f64 - self.anchor) / self.interval - GRID_EPSILON).ceil();
        let boundary = self.anchor + steps * self.interval;
        let boundary = if (boundary - boundary.round()).abs() < GRID_EPSILON {
            boundary.round()
        } else {
            boundary.ceil()
        };
        (boundary.max(0.0) as u64).max(at)
    }

    /// Number of ticks in `[start, end)`.
    pub fn ticks_in(&self, start: u64, end: u64) -> u32 {
        if end <= start {
            return 0;
        }
        let first = self.next_boundary(start);
        if first >= end {
            return 0;
        }
        1 + ((end - 1 - first) as f64 / self.interval).floor() as u32
    }
}

/// What the clock knows about the current block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockBlock {
    /// `None` when no valid interval exists this block.
    pub grid: Option<Grid>,
    /// Ticks that fell inside the block.
    pub ticks: u32,
    /// The cursor should move to the next tick (transport start or jump).
    pub realigned: bool,
}

#[derive(Debug, Clone, Copy)]
struct HostFrame {
    playing: bool,
    ppq: f64,
    beats_per_sample: f64,
    block_len: u64,
}

#[derive(Debug, Clone)]
pub struct Clock {
    sample_rate: f64,
    /// Samples since the last internal tick.
    accumulator: f64,
    last_host: Option<HostFrame>,
}

impl Clock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: f64::from(sample_rate),
            accumulator: 0.0,
            last_host: None,
        }
    }

    /// Compute the grid for `[block_start, block_start + block_len)` and advance.
    pub fn prepare(
        &mut self,
        block_start: u64,
        block_len: u64,
        params: &ParamSnapshot,
        host: Option<&HostTransport>,
    ) -> ClockBlock {
        if params.host_clock {
            match host {
                Some(host) => self.prepare_host(block_start, block_len, params.division, host),
                None => {
                    self.last_host = None;
                    ClockBlock::default()
                }
            }
        } else {
            self.last_host = None;
            self.prepare_internal(block_start, block_len, params.bpm, params.division)
        }
    }

    fn prepare_internal(
        &mut self,
        block_start: u64,
        block_len: u64,
        bpm: f64,
        division: u32,
    ) -> ClockBlock {
        let Some(interval) = samples_per_tick(self.sample_rate, bpm, division) else {
            return ClockBlock::default();
        };
        let grid = Grid::new(block_start as f64 - self.accumulator, interval);

        self.accumulator += block_len as f64;
        let ticks = (self.accumulator / interval).floor();
        self.accumulator -= ticks * interval;

        ClockBlock {
            grid,
            ticks: ticks as u32,
            realigned: false,
        }
    }

    fn prepare_host(
        &mut self,
        block_start: u64,
        block_len: u64,
        division: u32,
        host: &HostTransport,
    ) -> ClockBlock {
        let (Some(ppq), Some(bpm)) = (host.ppq_position, host.bpm) else {
            self.last_host = None;
            return ClockBlock::default();
        };
        let previous = self.last_host.replace(HostFrame {
            playing: host.playing,
            ppq,
            beats_per_sample: bpm / 60.0 / self.sample_rate,
            block_len,
        });
        if !host.playing {
            return ClockBlock::default();
        }
        let Some(interval) = samples_per_tick(self.sample_rate, bpm, division) else {
            return ClockBlock::default();
        };

        let started = !previous.is_some_and(|frame| frame.playing);
        let jumped = previous.is_some_and(|frame| {
            let expected = frame.ppq + frame.block_len as f64 * frame.beats_per_sample;
            frame.playing && (ppq - expected).abs() > JUMP_TOLERANCE_BEATS
        });
        if started || jumped {
            tracing::debug!(
                "Host clock realigned at ppq {:.3} (started: {}, jumped: {})",
                ppq,
                started,
                jumped
            );
        }

        let beats_per_sample = bpm / 60.0 / self.sample_rate;
        let tick_beats = 4.0 / f64::from(division);
        let next_tick_beat = (ppq / tick_beats - GRID_EPSILON).ceil() * tick_beats;
        let anchor = block_start as f64 + (next_tick_beat - ppq) / beats_per_sample;

        let grid = Grid::new(anchor, interval);
        ClockBlock {
            grid,
            ticks: grid.map_or(0, |g| g.ticks_in(block_start, block_start + block_len)),
            realigned: started || jumped,
        }
    }

    /// Samples since the last internal tick.
    #[inline]
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.last_host = None;
    }
}
