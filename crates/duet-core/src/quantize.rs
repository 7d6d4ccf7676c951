//! Rounding of trained durations and intervals to the tick grid.

/// Round `value` to the nearest multiple of `quantum`, ties to even.
///
/// A result of zero becomes one full `quantum`: a note or gap is never
/// quantized away. `quantum == 0` disables quantization.
pub fn quantize(value: u64, quantum: u64) -> u64 {
    if quantum == 0 {
        return value;
    }
    let mut steps = value / quantum;
    let remainder = value % quantum;
    // compare 2r with q without overflowing
    let half_up = remainder > quantum - remainder;
    let tie = remainder == quantum - remainder;
    if half_up || (tie && steps % 2 == 1) {
        steps += 1;
    }
    match steps.saturating_mul(quantum) {
        0 => quantum,
        rounded => rounded,
    }
}
