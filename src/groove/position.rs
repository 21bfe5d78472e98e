// Beat Positions - Tolerant beat locations within a bar
// Recurring decimals (triplets, sextuplets) compare by grid slot, never by exact float equality

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Slots per beat used to key positions (divisible by 2, 3, 4, 6, 8, 12 and 16)
pub const BEAT_RESOLUTION: f64 = 960.0;

/// Absolute tolerance when matching a fractional beat against a grid line
pub const GRID_EPSILON: f64 = 0.002;

/// A 1-based beat position within a bar (1.0 = downbeat, 2.5 = "and" of 2)
///
/// Two positions are equal when they round to the same 1/960-beat slot, so
/// `1.333`, `1.3333333` and `1.3334` are all the same position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeatPosition(f64);

impl BeatPosition {
    /// The downbeat of any bar
    pub const DOWNBEAT: BeatPosition = BeatPosition(1.0);

    /// Create a position from a 1-based beat value
    pub fn new(beat: f64) -> Self {
        BeatPosition(beat)
    }

    /// Raw beat value as given
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Quantized slot key used for equality, ordering and hashing
    pub fn key(&self) -> i64 {
        (self.0 * BEAT_RESOLUTION).round() as i64
    }

    /// Whole beat this position belongs to (1-based)
    pub fn beat_number(&self) -> u32 {
        let whole = (self.0 + GRID_EPSILON).floor();
        whole.max(0.0) as u32
    }

    /// Fractional offset within the beat, in [0.0, 1.0)
    pub fn fraction(&self) -> f64 {
        let whole = (self.0 + GRID_EPSILON).floor();
        (self.0 - whole).max(0.0)
    }

    /// True when the fractional part is within `epsilon` of `target`
    pub fn fraction_near(&self, target: f64, epsilon: f64) -> bool {
        (self.fraction() - target).abs() <= epsilon
    }

    /// True when the position lands on a whole beat
    pub fn is_on_beat(&self) -> bool {
        self.fraction_near(0.0, GRID_EPSILON)
    }

    /// True when the position lies inside a bar of `beats_per_bar` beats
    pub fn is_within_bar(&self, beats_per_bar: u32) -> bool {
        self.0.is_finite()
            && self.0 >= 1.0 - GRID_EPSILON
            && self.0 < beats_per_bar as f64 + 1.0 - GRID_EPSILON
    }

    /// Offset of this position from the downbeat, in beats
    pub fn offset_from_downbeat(&self) -> f64 {
        self.0 - 1.0
    }

    /// Shift by a number of beats
    pub fn shifted(&self, beats: f64) -> Self {
        BeatPosition(self.0 + beats)
    }
}

impl From<f64> for BeatPosition {
    fn from(beat: f64) -> Self {
        BeatPosition::new(beat)
    }
}

impl PartialEq for BeatPosition {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BeatPosition {}

impl Hash for BeatPosition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for BeatPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BeatPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for BeatPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_on_beat() {
            write!(f, "{}", self.beat_number())
        } else {
            write!(f, "{:.3}", self.0)
        }
    }
}

/// Build a list of positions from raw beat values
pub fn positions(beats: &[f64]) -> Vec<BeatPosition> {
    beats.iter().copied().map(BeatPosition::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_recurring_decimals_are_equal() {
        let a = BeatPosition::new(1.3333333);
        let b = BeatPosition::new(1.3334);
        let c = BeatPosition::new(1.333);
        let exact = BeatPosition::new(1.0 + 1.0 / 3.0);

        assert_eq!(a, exact);
        assert_eq!(b, exact);
        assert_eq!(c, exact);
    }

    #[test]
    fn test_distinct_sixteenths_are_distinct() {
        assert_ne!(BeatPosition::new(1.25), BeatPosition::new(1.5));
        assert!(BeatPosition::new(1.25) < BeatPosition::new(1.5));
    }

    #[test]
    fn test_set_deduplicates_by_slot() {
        let set: BTreeSet<BeatPosition> = positions(&[2.0, 2.0000001, 1.6666667, 1.6667])
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_fraction_and_beat_number() {
        let pickup = BeatPosition::new(2.75);
        assert_eq!(pickup.beat_number(), 2);
        assert!((pickup.fraction() - 0.75).abs() < 1e-9);

        // Just below a whole beat rounds onto the beat
        let nearly_three = BeatPosition::new(2.9995);
        assert_eq!(nearly_three.beat_number(), 3);
        assert!(nearly_three.is_on_beat());
    }

    #[test]
    fn test_within_bar() {
        assert!(BeatPosition::new(1.0).is_within_bar(4));
        assert!(BeatPosition::new(4.75).is_within_bar(4));
        assert!(!BeatPosition::new(5.0).is_within_bar(4));
        assert!(!BeatPosition::new(0.5).is_within_bar(4));
        assert!(!BeatPosition::new(f64::NAN).is_within_bar(4));
        assert!(!BeatPosition::new(4.0).is_within_bar(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(BeatPosition::new(3.0).to_string(), "3");
        assert_eq!(BeatPosition::new(2.5).to_string(), "2.500");
    }
}
