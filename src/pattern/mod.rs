//! Recoil Patterns
//!
//! A pattern is an ordered list of displacement/delay triples describing
//! cumulative recoil over a weapon's firing sequence. This module holds the
//! point type, the subdivision algorithm that splits each recorded point
//! into several smaller movements, and the weapon profiles that cache the
//! subdivided result.

use serde::{Deserialize, Serialize};

pub mod profile;

pub use profile::{ProfileError, ProfileStore, WeaponProfile, WeaponProfileSpec};

/// A single recoil compensation point.
///
/// `delay_ms` is the time elapsing *before* this point is allowed to apply,
/// measured from the start of the compensation session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoilPoint {
    /// Horizontal displacement
    pub dx: f64,
    /// Vertical displacement
    pub dy: f64,
    /// Delay in milliseconds before this point applies
    pub delay_ms: f64,
}

impl RecoilPoint {
    /// Create a point from its components
    pub fn new(dx: f64, dy: f64, delay_ms: f64) -> Self {
        Self { dx, dy, delay_ms }
    }
}

/// Subdivide a recorded pattern into `multiple` sub-points per raw point,
/// preserving the total displacement exactly.
///
/// Each sub-point's `dx`/`dy` is the truncating division of the raw value by
/// `multiple` (toward zero, so the sign of small displacements never flips).
/// After emitting a raw point's block, the running rounding deficit
/// `round(Σ raw − Σ emitted)` is distributed as ±1 over the last sub-points
/// of that block, walking backward from the most recently emitted one.
/// `delay_ms` is copied unchanged: subdivision alters spatial resolution,
/// not timing.
///
/// `length` caps how many *raw* points are processed; extra raw points are
/// ignored, not subdivided. For `multiple <= 1` the truncated raw pattern is
/// returned verbatim.
///
/// Postconditions: output length is `min(length, pattern.len()) * multiple`
/// (for `multiple >= 2`), and the output `dx`/`dy` sums match the truncated
/// raw sums to the rounding of the final `round()` only.
pub fn subdivide(pattern: &[RecoilPoint], multiple: u32, length: usize) -> Vec<RecoilPoint> {
    let take = pattern.len().min(length);
    if take == 0 {
        return Vec::new();
    }
    if multiple <= 1 {
        return pattern[..take].to_vec();
    }

    let divisor = f64::from(multiple);
    let mut result = Vec::with_capacity(take * multiple as usize);

    // Running totals; emitted values are integer-valued so the gap below is
    // exactly the accumulated fractional residue.
    let mut emitted_x = 0.0;
    let mut emitted_y = 0.0;
    let mut raw_x = 0.0;
    let mut raw_y = 0.0;

    for point in &pattern[..take] {
        let sub_dx = (point.dx / divisor).trunc();
        let sub_dy = (point.dy / divisor).trunc();

        for _ in 0..multiple {
            result.push(RecoilPoint::new(sub_dx, sub_dy, point.delay_ms));
            emitted_x += sub_dx;
            emitted_y += sub_dy;
        }

        raw_x += point.dx;
        raw_y += point.dy;

        let gap_x = (raw_x - emitted_x).round() as i64;
        let gap_y = (raw_y - emitted_y).round() as i64;

        emitted_x += distribute_gap(&mut result, gap_x, |p| &mut p.dx);
        emitted_y += distribute_gap(&mut result, gap_y, |p| &mut p.dy);
    }

    result
}

/// Spread `gap` as ±1 steps over the most recently emitted sub-points,
/// walking backward. Returns the total correction applied.
fn distribute_gap(
    result: &mut [RecoilPoint],
    gap: i64,
    field: fn(&mut RecoilPoint) -> &mut f64,
) -> f64 {
    let step = if gap >= 0 { 1.0 } else { -1.0 };
    let count = (gap.unsigned_abs() as usize).min(result.len());
    let len = result.len();

    for k in 0..count {
        *field(&mut result[len - 1 - k]) += step;
    }

    step * count as f64
}

/// Sum of `dx` and `dy` over a pattern slice
pub fn displacement_sums(pattern: &[RecoilPoint]) -> (f64, f64) {
    pattern
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.dx, y + p.dy))
}
