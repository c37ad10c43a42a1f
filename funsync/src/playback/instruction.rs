//! Position-to-instruction mapping
//!
//! Script positions (0..=100, percent) are mapped to normalized device
//! instructions in `[0, 1]`, where 1.0 is minimum output and 0.0 is maximum.
//! Between two actions the instruction is interpolated linearly in output
//! space so devices ramp instead of stepping.

use crate::script::Action;

/// Gaps longer than this are silence, not a slow movement to ramp across
const GAP_THRESHOLD_MS: i64 = 15_000;

/// Pure mapping from script positions to device instructions
///
/// Carries the configured output shaping (multiplier and clamp bounds);
/// holds no playback state, so the same inputs always produce the same
/// output.
#[derive(Debug, Clone, Copy)]
pub struct InstructionMap {
    multiplier: f64,
    clamp_lo: f64,
    clamp_hi: f64,
}

impl InstructionMap {
    /// Create a mapping with the given position multiplier and clamp range
    ///
    /// `range` bounds the scaled position (percent, `[0, 100]` by default)
    /// before normalization, letting a config narrow the usable band.
    pub fn new(multiplier: f64, range: [f64; 2]) -> Self {
        Self {
            multiplier,
            clamp_lo: range[0],
            clamp_hi: range[1],
        }
    }

    /// Map a single position directly to an instruction
    ///
    /// Inverted scale: position 0 maps to 1.0 (minimum output), position
    /// 100 maps to 0.0 (maximum output).
    pub fn direct(&self, pos: u8) -> f64 {
        1.0 - (pos as f64 * self.multiplier).clamp(self.clamp_lo, self.clamp_hi) * 0.01
    }

    /// Instruction for a playback position within the current interval
    ///
    /// Ramps from the previously issued instruction toward the current
    /// action's instruction as `position_ms` advances across
    /// `[current.at, next.at]`. Falls back to the direct mapping when there
    /// is nothing to ramp between:
    /// - `next` is absent (final action) or not later than `current`
    /// - the interval to `next` exceeds the gap threshold (silence)
    /// - no previous instruction exists yet
    pub fn compute(
        &self,
        previous_changed: Option<&Action>,
        current: &Action,
        next: Option<&Action>,
        position_ms: f64,
    ) -> f64 {
        let target = match next {
            Some(next) if next.at - current.at > GAP_THRESHOLD_MS => None,
            Some(next) if next.at > current.at => Some(next),
            _ => None,
        };
        let (Some(previous), Some(next)) = (previous_changed, target) else {
            return self.direct(current.pos);
        };

        let span = (next.at - current.at) as f64;
        let progress = ((position_ms - current.at as f64) / span).clamp(0.0, 1.0);
        self.direct(previous.pos) * (1.0 - progress) + self.direct(current.pos) * progress
    }
}
