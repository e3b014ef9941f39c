//! Circular (wrap-around) arithmetic on angles in degrees.
//!
//! Every place that compares, measures or tests angles goes through this
//! module: sector validation, sector resolution and vuelta progress.

use serde::{Deserialize, Serialize};

pub const FULL_TURN: f64 = 360.0;

/// Normalize a finite angle into `[0, 360)`.
#[must_use]
pub fn normalize(angle: f64) -> f64 {
    let a = angle.rem_euclid(FULL_TURN);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if a >= FULL_TURN { 0.0 } else { a }
}

/// Forward travel from `from` to `to`, in `[0, 360)`.
#[must_use]
pub fn forward_delta(from: f64, to: f64) -> f64 {
    normalize(to - from)
}

/// Shortest signed delta from `from` to `to`, in `(-180, 180]`.
///
/// Positive means forward rotation.
#[must_use]
pub fn signed_delta(from: f64, to: f64) -> f64 {
    let d = forward_delta(from, to);
    if d > FULL_TURN / 2.0 { d - FULL_TURN } else { d }
}

/// Half-open angular range `[start, end)`; wraps through 0° when `end < start`.
///
/// `full` marks a whole turn, whose normalized bounds coincide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcRange {
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full: bool,
}

impl ArcRange {
    /// Build a range from raw bounds, normalizing both ends.
    ///
    /// Raw bounds exactly one turn apart (`0..360`) give a full-turn range.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: normalize(start),
            end: normalize(end),
            full: (end - start).abs() == FULL_TURN,
        }
    }

    #[must_use]
    pub fn wraps(&self) -> bool {
        !self.full && self.end < self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.full && self.start == self.end
    }

    /// End bound as configured: `start + 360` for a full turn.
    #[must_use]
    pub fn end_degrees(&self) -> f64 {
        if self.full {
            self.start + FULL_TURN
        } else {
            self.end
        }
    }

    /// Angular span in degrees.
    #[must_use]
    pub fn span(&self) -> f64 {
        if self.full {
            FULL_TURN
        } else if self.wraps() {
            (FULL_TURN - self.start) + self.end
        } else {
            self.end - self.start
        }
    }

    /// Start inclusive, end exclusive.
    #[must_use]
    pub fn contains(&self, angle: f64) -> bool {
        if self.full {
            return angle.is_finite();
        }
        let a = normalize(angle);
        if self.wraps() {
            a >= self.start || a < self.end
        } else {
            a >= self.start && a < self.end
        }
    }

    /// The range as a linear interval, with the end pushed past 360 when it wraps.
    fn unrolled(&self) -> (f64, f64) {
        if self.full {
            (self.start, self.start + FULL_TURN)
        } else if self.wraps() {
            (self.start, self.end + FULL_TURN)
        } else {
            (self.start, self.end)
        }
    }

    /// True when the two ranges share at least one angle.
    #[must_use]
    pub fn overlaps(&self, other: &ArcRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (a0, a1) = self.unrolled();
        let (b0, b1) = other.unrolled();
        [-FULL_TURN, 0.0, FULL_TURN]
            .iter()
            .any(|shift| a0 < b1 + shift && b0 + shift < a1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_into_one_turn() {
        assert_eq!(normalize(0.0), 0.0);
        assert_eq!(normalize(360.0), 0.0);
        assert_eq!(normalize(370.0), 10.0);
        assert_eq!(normalize(-10.0), 350.0);
        assert!(normalize(-1e-15) < FULL_TURN);
    }

    #[test]
    fn signed_delta_picks_shortest_way() {
        assert_eq!(signed_delta(350.0, 10.0), 20.0);
        assert_eq!(signed_delta(10.0, 350.0), -20.0);
        assert_eq!(signed_delta(0.0, 180.0), 180.0);
    }

    #[test]
    fn full_turn_covers_every_angle() {
        let full = ArcRange::new(0.0, 360.0);
        assert!(full.full);
        assert!(!full.is_empty());
        assert!(!full.wraps());
        assert_eq!(full.span(), FULL_TURN);
        assert_eq!(full.end_degrees(), FULL_TURN);
        assert!(full.contains(0.0) && full.contains(359.99) && full.contains(-5.0));
        assert!(full.overlaps(&ArcRange::new(350.0, 10.0)));
        assert!(ArcRange::new(90.0, 90.0).is_empty());
    }
}
