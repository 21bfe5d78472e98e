// Onsets - Discrete drum hit placements flowing through the pipeline
// Each stage returns a new onset list rather than mutating its input

use serde::{Deserialize, Serialize};

use crate::groove::position::BeatPosition;
use super::roles::DrumRole;

/// Velocity used for synthesized and hint-less onsets
pub const DEFAULT_VELOCITY: u8 = 100;

/// Where an onset came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OnsetSource {
    /// Fixed anchor pattern of the groove preset
    Anchor,

    /// Selected operator candidate
    Operator {
        operator_id: String,
        candidate_id: String,
    },

    /// Synthesized by protection enforcement
    Protection,
}

/// Identity of an onset: (bar, beat, role)
pub type OnsetKey = (u32, BeatPosition, DrumRole);

/// A single rhythmic event placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Onset {
    /// Kit voice
    pub role: DrumRole,

    /// Bar number (1-indexed)
    pub bar: u32,

    /// Beat position within the bar (1-indexed)
    pub beat: BeatPosition,

    /// MIDI velocity (0-127)
    pub velocity: u8,

    /// Micro-timing offset applied when converting to ticks
    pub timing_offset_ticks: i32,

    /// Must be present in the final output
    pub must_hit: bool,

    /// May not be removed by filters
    pub never_remove: bool,

    /// Marked protected by a protection layer
    pub protected: bool,

    /// Originating stage
    pub source: OnsetSource,
}

impl Onset {
    /// Create an anchor onset (always must-hit)
    pub fn anchor(role: DrumRole, bar: u32, beat: BeatPosition, velocity: u8) -> Self {
        Onset {
            role,
            bar,
            beat,
            velocity: velocity.min(127),
            timing_offset_ticks: 0,
            must_hit: true,
            never_remove: false,
            protected: false,
            source: OnsetSource::Anchor,
        }
    }

    /// Create an onset for a selected operator candidate
    pub fn from_operator(
        role: DrumRole,
        bar: u32,
        beat: BeatPosition,
        velocity: u8,
        operator_id: impl Into<String>,
        candidate_id: impl Into<String>,
    ) -> Self {
        Onset {
            role,
            bar,
            beat,
            velocity: velocity.min(127),
            timing_offset_ticks: 0,
            must_hit: false,
            never_remove: false,
            protected: false,
            source: OnsetSource::Operator {
                operator_id: operator_id.into(),
                candidate_id: candidate_id.into(),
            },
        }
    }

    /// Create an onset synthesized to satisfy a MustHit protection
    pub fn protection(role: DrumRole, bar: u32, beat: BeatPosition, velocity: u8) -> Self {
        Onset {
            role,
            bar,
            beat,
            velocity: velocity.min(127),
            timing_offset_ticks: 0,
            must_hit: true,
            never_remove: false,
            protected: true,
            source: OnsetSource::Protection,
        }
    }

    /// Copy with a timing offset
    pub fn with_timing_offset(mut self, ticks: i32) -> Self {
        self.timing_offset_ticks = ticks;
        self
    }

    /// Copy with the never-remove flag set
    pub fn with_never_remove(mut self) -> Self {
        self.never_remove = true;
        self.protected = true;
        self
    }

    /// Identity key used for de-duplication
    pub fn key(&self) -> OnsetKey {
        (self.bar, self.beat, self.role)
    }

    /// Check whether this onset sits at the given place
    pub fn is_at(&self, bar: u32, beat: BeatPosition, role: DrumRole) -> bool {
        self.bar == bar && self.beat == beat && self.role == role
    }

    /// True for anchor-pattern onsets
    pub fn is_anchor(&self) -> bool {
        self.source == OnsetSource::Anchor
    }

    /// Operator id for operator-derived onsets
    pub fn operator_id(&self) -> Option<&str> {
        match &self.source {
            OnsetSource::Operator { operator_id, .. } => Some(operator_id.as_str()),
            _ => None,
        }
    }
}

/// Sort onsets by bar, beat and role
pub fn sort_onsets(onsets: &mut [Onset]) {
    onsets.sort_by_key(|onset| onset.key());
}
