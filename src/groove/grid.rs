// Musical Grid - Meter and allowed subdivision grids
// Provides structure for subdivision filtering and tick conversion

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use thiserror::Error;

use super::position::{BeatPosition, GRID_EPSILON};

/// Errors raised while parsing a meter string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeterError {
    #[error("Malformed meter string '{0}' (expected e.g. \"4/4\")")]
    Malformed(String),

    #[error("Meter '{0}' has a zero numerator or denominator")]
    ZeroComponent(String),

    #[error("Meter '{0}' has a denominator that is not a power of two")]
    UnsupportedDenominator(String),
}

/// Musical time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar
    pub numerator: u32,

    /// Note value that gets one beat (4 = quarter note)
    pub denominator: u32,
}

impl TimeSignature {
    /// 4/4 time - most common
    pub const FOUR_FOUR: TimeSignature = TimeSignature { numerator: 4, denominator: 4 };

    /// 3/4 time - waltz feel
    pub const THREE_FOUR: TimeSignature = TimeSignature { numerator: 3, denominator: 4 };

    /// Parse a meter string such as "4/4", "3/4" or "6/8"
    pub fn parse(meter: &str) -> Result<Self, MeterError> {
        let (num, den) = meter
            .trim()
            .split_once('/')
            .ok_or_else(|| MeterError::Malformed(meter.to_string()))?;

        let numerator: u32 = num
            .trim()
            .parse()
            .map_err(|_| MeterError::Malformed(meter.to_string()))?;
        let denominator: u32 = den
            .trim()
            .parse()
            .map_err(|_| MeterError::Malformed(meter.to_string()))?;

        if numerator == 0 || denominator == 0 {
            return Err(MeterError::ZeroComponent(meter.to_string()));
        }
        if !denominator.is_power_of_two() {
            return Err(MeterError::UnsupportedDenominator(meter.to_string()));
        }

        Ok(TimeSignature { numerator, denominator })
    }

    /// Get number of beats per bar
    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }

    /// Get the note value that gets one beat
    pub fn beat_unit(&self) -> u32 {
        self.denominator
    }

    /// Ticks per beat for a given quarter-note resolution
    pub fn ticks_per_beat(&self, ticks_per_quarter: u32) -> u32 {
        ticks_per_quarter * 4 / self.denominator
    }

    /// Ticks per bar for a given quarter-note resolution
    pub fn ticks_per_bar(&self, ticks_per_quarter: u32) -> u32 {
        self.ticks_per_beat(ticks_per_quarter) * self.numerator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::FOUR_FOUR
    }
}

/// Backbeat positions that exist in a bar: every even beat (2 and 4 in 4/4, 2 in 3/4)
pub fn backbeats(beats_per_bar: u32) -> Vec<BeatPosition> {
    (2..=beats_per_bar)
        .step_by(2)
        .map(|beat| BeatPosition::new(beat as f64))
        .collect()
}

/// A single rhythmic grid resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubdivisionGrid {
    /// Quarter notes (1 per beat)
    Quarter,

    /// Eighth notes (2 per beat)
    Eighth,

    /// Sixteenth notes (4 per beat)
    Sixteenth,

    /// Eighth-note triplets (3 per beat)
    EighthTriplet,

    /// Sixteenth-note triplets (6 per beat)
    SixteenthTriplet,
}

impl SubdivisionGrid {
    /// All grids in ascending resolution order
    pub const ALL: [SubdivisionGrid; 5] = [
        SubdivisionGrid::Quarter,
        SubdivisionGrid::Eighth,
        SubdivisionGrid::Sixteenth,
        SubdivisionGrid::EighthTriplet,
        SubdivisionGrid::SixteenthTriplet,
    ];

    /// Get number of subdivisions per beat
    pub fn subdivisions_per_beat(&self) -> u32 {
        match self {
            SubdivisionGrid::Quarter => 1,
            SubdivisionGrid::Eighth => 2,
            SubdivisionGrid::Sixteenth => 4,
            SubdivisionGrid::EighthTriplet => 3,
            SubdivisionGrid::SixteenthTriplet => 6,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            SubdivisionGrid::Quarter => 1 << 0,
            SubdivisionGrid::Eighth => 1 << 1,
            SubdivisionGrid::Sixteenth => 1 << 2,
            SubdivisionGrid::EighthTriplet => 1 << 3,
            SubdivisionGrid::SixteenthTriplet => 1 << 4,
        }
    }

    /// True when the position's fraction within its beat lies on this grid
    pub fn contains(&self, position: BeatPosition) -> bool {
        let fraction = position.fraction();
        let slots = self.subdivisions_per_beat();
        (0..=slots).any(|slot| {
            let line = slot as f64 / slots as f64;
            (fraction - line).abs() <= GRID_EPSILON
        })
    }

    /// Every grid position within a bar (1-based beats)
    pub fn positions_in_bar(&self, beats_per_bar: u32) -> Vec<BeatPosition> {
        let slots = self.subdivisions_per_beat();
        (0..beats_per_bar * slots)
            .map(|i| BeatPosition::new(1.0 + i as f64 / slots as f64))
            .collect()
    }
}

/// Bit-set of allowed subdivision grids
///
/// `SubdivisionPolicy::NONE` allows nothing; grids combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SubdivisionGrid>", into = "Vec<SubdivisionGrid>")]
pub struct SubdivisionPolicy(u8);

impl SubdivisionPolicy {
    pub const NONE: SubdivisionPolicy = SubdivisionPolicy(0);
    pub const QUARTER: SubdivisionPolicy = SubdivisionPolicy(1 << 0);
    pub const EIGHTH: SubdivisionPolicy = SubdivisionPolicy(1 << 1);
    pub const SIXTEENTH: SubdivisionPolicy = SubdivisionPolicy(1 << 2);
    pub const EIGHTH_TRIPLET: SubdivisionPolicy = SubdivisionPolicy(1 << 3);
    pub const SIXTEENTH_TRIPLET: SubdivisionPolicy = SubdivisionPolicy(1 << 4);

    /// Build a policy from a list of grids
    pub fn from_grids(grids: &[SubdivisionGrid]) -> Self {
        SubdivisionPolicy(grids.iter().fold(0, |bits, grid| bits | grid.bit()))
    }

    /// True when no grid is enabled
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Check whether a grid is enabled
    pub fn allows_grid(&self, grid: SubdivisionGrid) -> bool {
        self.0 & grid.bit() != 0
    }

    /// Enabled grids in ascending resolution order
    pub fn grids(&self) -> Vec<SubdivisionGrid> {
        SubdivisionGrid::ALL
            .iter()
            .copied()
            .filter(|grid| self.allows_grid(*grid))
            .collect()
    }

    /// True when the position matches any enabled grid
    pub fn allows(&self, position: BeatPosition) -> bool {
        SubdivisionGrid::ALL
            .iter()
            .any(|grid| self.allows_grid(*grid) && grid.contains(position))
    }
}

impl BitOr for SubdivisionPolicy {
    type Output = SubdivisionPolicy;

    fn bitor(self, rhs: Self) -> Self::Output {
        SubdivisionPolicy(self.0 | rhs.0)
    }
}

impl From<Vec<SubdivisionGrid>> for SubdivisionPolicy {
    fn from(grids: Vec<SubdivisionGrid>) -> Self {
        SubdivisionPolicy::from_grids(&grids)
    }
}

impl From<SubdivisionPolicy> for Vec<SubdivisionGrid> {
    fn from(policy: SubdivisionPolicy) -> Self {
        policy.grids()
    }
}
