//! Tolerance constants for integration tests.
//!
//! Generation is random (seeded), so rates are compared statistically while
//! values computed from MIDI data are compared at float precision.

/// Rounding error of a 7-bit controller value mapped to 0.0..=1.0.
pub const CC_EPSILON: f32 = 1e-6;

/// Allowed distance between an observed play rate and its probability.
/// About four standard deviations at a few hundred cycles.
pub const RATE_TOLERANCE: f64 = 0.1;
