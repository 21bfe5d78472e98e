// Operator Types - Candidate records and the operator trait
// Operators propose; the selection engine decides

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arranger::onset::Onset;
use crate::arranger::roles::DrumRole;
use crate::arranger::style::StyleId;
use crate::groove::grid::backbeats;
use crate::groove::position::{BeatPosition, GRID_EPSILON};
use crate::selection::memory::AntiRepetitionMemory;
use crate::song::{BarContext, SectionType};

/// Operator families, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorFamily {
    /// Ghost notes and pickups around the anchors
    MicroAddition,

    /// Denser or different time-keeping
    SubdivisionTransform,

    /// Crashes, setups and fills at phrase boundaries
    PhrasePunctuation,

    /// Alternative kick/snare figures
    PatternSubstitution,

    /// Genre-specific figures
    StyleIdiom,
}

impl OperatorFamily {
    pub const ALL: [OperatorFamily; 5] = [
        OperatorFamily::MicroAddition,
        OperatorFamily::SubdivisionTransform,
        OperatorFamily::PhrasePunctuation,
        OperatorFamily::PatternSubstitution,
        OperatorFamily::StyleIdiom,
    ];

    /// Convert to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            OperatorFamily::MicroAddition => "micro_addition",
            OperatorFamily::SubdivisionTransform => "subdivision_transform",
            OperatorFamily::PhrasePunctuation => "phrase_punctuation",
            OperatorFamily::PatternSubstitution => "pattern_substitution",
            OperatorFamily::StyleIdiom => "style_idiom",
        }
    }
}

/// Metric weight of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetStrength {
    Downbeat,
    Backbeat,
    Offbeat,
    Pickup,
}

impl OnsetStrength {
    /// Classify a position in a bar of `beats_per_bar` beats
    ///
    /// Whole beats are backbeats when even, downbeats otherwise. Positions in
    /// the last quarter of a beat lead into the next one and count as pickups.
    pub fn classify(position: BeatPosition, beats_per_bar: u32) -> Self {
        if position.is_on_beat() {
            let is_backbeat = backbeats(beats_per_bar)
                .iter()
                .any(|b| b.beat_number() == position.beat_number());
            if is_backbeat {
                OnsetStrength::Backbeat
            } else {
                OnsetStrength::Downbeat
            }
        } else if position.fraction() >= 0.75 - GRID_EPSILON {
            OnsetStrength::Pickup
        } else {
            OnsetStrength::Offbeat
        }
    }
}

/// Part a candidate plays within a fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillRole {
    Setup,
    FillStart,
    FillBody,
    FillEnd,
}

/// One proposed onset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumCandidate {
    /// Stable id: `operator:role:beat`
    pub candidate_id: String,

    /// Proposing operator
    pub operator_id: String,

    /// Proposing operator's family
    pub family: OperatorFamily,

    pub role: DrumRole,

    pub beat: BeatPosition,

    pub strength: OnsetStrength,

    /// Relative preference (finite, non-negative)
    pub score: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_hint: Option<u8>,

    /// Micro-timing at 480 PPQ, rescaled to the run's resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_hint_ticks: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_role: Option<FillRole>,

    /// Max candidates of this operator selectable in one bar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_adds_per_bar: Option<u32>,
}

impl DrumCandidate {
    /// Create a candidate; the id is derived from operator, role and beat
    pub fn new(
        operator_id: &str,
        family: OperatorFamily,
        role: DrumRole,
        beat: BeatPosition,
        strength: OnsetStrength,
        score: f64,
    ) -> Self {
        DrumCandidate {
            candidate_id: format!("{}:{}:{:.3}", operator_id, role.to_str(), beat.value()),
            operator_id: operator_id.to_string(),
            family,
            role,
            beat,
            strength,
            score,
            velocity_hint: None,
            timing_hint_ticks: None,
            fill_role: None,
            max_adds_per_bar: None,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity_hint = Some(velocity.min(127));
        self
    }

    pub fn with_timing(mut self, ticks: i32) -> Self {
        self.timing_hint_ticks = Some(ticks);
        self
    }

    pub fn with_fill_role(mut self, fill_role: FillRole) -> Self {
        self.fill_role = Some(fill_role);
        self
    }

    pub fn with_max_adds(mut self, max_adds: u32) -> Self {
        self.max_adds_per_bar = Some(max_adds);
        self
    }

    /// True for fill candidates
    pub fn is_fill(&self) -> bool {
        self.fill_role.is_some()
    }
}

/// Errors an operator may raise
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OperatorError {
    #[error("Operator {operator_id} cannot handle {beats_per_bar} beats per bar")]
    UnsupportedMeter { operator_id: String, beats_per_bar: u32 },

    #[error("Operator {operator_id} produced an invalid beat {beat}")]
    InvalidBeat { operator_id: String, beat: f64 },

    #[error("Operator {operator_id} failed: {message}")]
    Failed { operator_id: String, message: String },
}

/// Everything an operator may look at for one bar
#[derive(Debug, Clone, Copy)]
pub struct OperatorContext<'a> {
    pub bar: &'a BarContext,
    pub beats_per_bar: u32,

    /// Anchor onsets of this bar
    pub anchors: &'a [Onset],

    pub style: StyleId,
    pub memory: &'a AntiRepetitionMemory,
}

impl<'a> OperatorContext<'a> {
    pub fn new(
        bar: &'a BarContext,
        beats_per_bar: u32,
        anchors: &'a [Onset],
        style: StyleId,
        memory: &'a AntiRepetitionMemory,
    ) -> Self {
        OperatorContext {
            bar,
            beats_per_bar,
            anchors,
            style,
            memory,
        }
    }

    /// Section energy in [0, 1]
    pub fn energy(&self) -> f64 {
        self.bar.energy()
    }

    pub fn section_type(&self) -> Option<SectionType> {
        self.bar.section_type()
    }

    /// True when some anchor plays `role`
    pub fn has_role(&self, role: DrumRole) -> bool {
        self.anchors.iter().any(|onset| onset.role == role)
    }

    /// True when an anchor plays `role` at `beat`
    pub fn has_anchor(&self, role: DrumRole, beat: BeatPosition) -> bool {
        self.anchors
            .iter()
            .any(|onset| onset.role == role && onset.beat == beat)
    }

    /// Anchor beats of a role, in order
    pub fn anchor_beats(&self, role: DrumRole) -> Vec<BeatPosition> {
        let mut beats: Vec<BeatPosition> = self
            .anchors
            .iter()
            .filter(|onset| onset.role == role)
            .map(|onset| onset.beat)
            .collect();
        beats.sort();
        beats.dedup();
        beats
    }

    /// Whole beats of the bar: 1.0, 2.0, ...
    pub fn whole_beats(&self) -> Vec<BeatPosition> {
        (1..=self.beats_per_bar)
            .map(|b| BeatPosition::new(b as f64))
            .collect()
    }

    /// Last whole beat of the bar
    pub fn last_beat(&self) -> BeatPosition {
        BeatPosition::new(self.beats_per_bar.max(1) as f64)
    }

    /// True when `beat` lies inside this bar
    pub fn in_bar(&self, beat: BeatPosition) -> bool {
        beat.is_within_bar(self.beats_per_bar)
    }

    /// Classify a position in this bar
    pub fn strength(&self, beat: BeatPosition) -> OnsetStrength {
        OnsetStrength::classify(beat, self.beats_per_bar)
    }
}

/// A rule that proposes candidate onsets for a bar
///
/// Implementations must be deterministic: the same context yields the same
/// candidates in the same order.
pub trait DrumOperator {
    /// Stable snake_case id
    fn id(&self) -> &'static str;

    fn family(&self) -> OperatorFamily;

    /// Whether the operator has anything to say about this bar
    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError>;

    /// Candidates for this bar; only called when `can_apply` returned true
    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError>;

    /// Candidate helper tagged with this operator's id and family
    fn candidate(
        &self,
        ctx: &OperatorContext<'_>,
        role: DrumRole,
        beat: BeatPosition,
        score: f64,
    ) -> DrumCandidate {
        DrumCandidate::new(self.id(), self.family(), role, beat, ctx.strength(beat), score)
    }
}
