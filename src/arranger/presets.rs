// Groove Presets - Anchor patterns plus the protections that guard them
// Built-in presets and JSON load/save for custom ones

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::groove::grid::{backbeats, SubdivisionPolicy};
use crate::groove::position::BeatPosition;
use crate::groove::syncopation::{RoleConstraintPolicy, RoleRhythmVocabulary};
use crate::protection::{
    ActivationPredicate, PhraseHookPolicy, ProtectionKind, ProtectionLayer, RoleProtectionSet,
    TAG_SECTION_START,
};
use super::onset::{Onset, DEFAULT_VELOCITY};
use super::roles::DrumRole;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Preset {preset}: {role} anchor beat {beat} outside a {beats_per_bar}-beat bar")]
    InvalidAnchorBeat {
        preset: String,
        role: DrumRole,
        beat: f64,
        beats_per_bar: u32,
    },

    #[error("Preset {preset}: {role} velocity {velocity} exceeds 127")]
    InvalidVelocity {
        preset: String,
        role: DrumRole,
        velocity: u8,
    },

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

pub type PresetResult<T> = Result<T, PresetError>;

/// Built-in grooves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetId {
    /// Kick on the odd beats, snare on the backbeats, 8th hats
    PopRockBasic,

    /// Snare on the middle of the bar, quarter hats
    HalfTime,

    /// Rock skeleton under 16th hats, syncopation welcome
    FunkSixteenths,

    /// Hats on the beat and the last triplet partial
    TripletShuffle,
}

impl PresetId {
    pub const ALL: [PresetId; 4] = [
        PresetId::PopRockBasic,
        PresetId::HalfTime,
        PresetId::FunkSixteenths,
        PresetId::TripletShuffle,
    ];

    /// Convert from string representation
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pop_rock_basic" => Some(PresetId::PopRockBasic),
            "half_time" => Some(PresetId::HalfTime),
            "funk_sixteenths" => Some(PresetId::FunkSixteenths),
            "triplet_shuffle" => Some(PresetId::TripletShuffle),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            PresetId::PopRockBasic => "pop_rock_basic",
            PresetId::HalfTime => "half_time",
            PresetId::FunkSixteenths => "funk_sixteenths",
            PresetId::TripletShuffle => "triplet_shuffle",
        }
    }

    /// Build the preset for a meter
    pub fn build(&self, beats_per_bar: u32) -> GroovePreset {
        match self {
            PresetId::PopRockBasic => pop_rock_basic(beats_per_bar),
            PresetId::HalfTime => half_time(beats_per_bar),
            PresetId::FunkSixteenths => funk_sixteenths(beats_per_bar),
            PresetId::TripletShuffle => triplet_shuffle(beats_per_bar),
        }
    }
}

/// One role's fixed hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPattern {
    pub role: DrumRole,
    pub beats: Vec<BeatPosition>,
    pub velocity: u8,
}

impl AnchorPattern {
    pub fn new(role: DrumRole, beats: Vec<BeatPosition>, velocity: u8) -> Self {
        AnchorPattern {
            role,
            beats,
            velocity,
        }
    }
}

/// The fixed part of a groove, repeated every bar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorLayer {
    pub patterns: Vec<AnchorPattern>,
}

impl AnchorLayer {
    /// Anchor onsets for one bar, skipping beats outside the bar
    pub fn onsets_for_bar(&self, bar: u32, beats_per_bar: u32) -> Vec<Onset> {
        let mut onsets: Vec<Onset> = self
            .patterns
            .iter()
            .flat_map(|pattern| {
                pattern
                    .beats
                    .iter()
                    .filter(|beat| beat.is_within_bar(beats_per_bar))
                    .map(move |beat| Onset::anchor(pattern.role, bar, *beat, pattern.velocity))
            })
            .collect();
        super::onset::sort_onsets(&mut onsets);
        onsets.dedup_by(|a, b| a.key() == b.key());
        onsets
    }
}

/// Everything that constrains operator output for a preset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    /// Layer stack, merged per bar against the bar's tags
    #[serde(default)]
    pub layers: Vec<ProtectionLayer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision: Option<SubdivisionPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_constraints: Option<RoleConstraintPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_hook: Option<PhraseHookPolicy>,
}

/// Velocity handling for generated hits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationDefaults {
    /// Velocity for synthesized MustHit onsets and hint-less candidates
    pub default_velocity: u8,

    /// Multiplier on operator velocities
    pub operator_velocity_scale: f64,
}

impl Default for OrchestrationDefaults {
    fn default() -> Self {
        OrchestrationDefaults {
            default_velocity: DEFAULT_VELOCITY,
            operator_velocity_scale: 1.0,
        }
    }
}

impl OrchestrationDefaults {
    /// Scale an operator velocity, keeping it audible and in MIDI range
    pub fn scale_velocity(&self, velocity: u8) -> u8 {
        let scaled = velocity as f64 * self.operator_velocity_scale;
        if scaled.is_finite() {
            scaled.round().clamp(1.0, 127.0) as u8
        } else {
            velocity
        }
    }
}

/// A complete groove definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroovePreset {
    pub name: String,
    pub anchors: AnchorLayer,
    #[serde(default)]
    pub protection: ProtectionPolicy,
    #[serde(default)]
    pub orchestration: OrchestrationDefaults,
}

impl GroovePreset {
    /// Look up a built-in preset by name
    pub fn builtin(name: &str, beats_per_bar: u32) -> PresetResult<Self> {
        PresetId::from_string(name)
            .map(|id| id.build(beats_per_bar))
            .ok_or_else(|| PresetError::UnknownPreset(name.to_string()))
    }

    /// Check anchors against a meter
    pub fn validate(&self, beats_per_bar: u32) -> PresetResult<()> {
        for pattern in &self.anchors.patterns {
            if pattern.velocity > 127 {
                return Err(PresetError::InvalidVelocity {
                    preset: self.name.clone(),
                    role: pattern.role,
                    velocity: pattern.velocity,
                });
            }
            if let Some(beat) = pattern
                .beats
                .iter()
                .find(|beat| !beat.is_within_bar(beats_per_bar))
            {
                return Err(PresetError::InvalidAnchorBeat {
                    preset: self.name.clone(),
                    role: pattern.role,
                    beat: beat.value(),
                    beats_per_bar,
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> PresetResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> PresetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a preset from a JSON file
    pub fn load(path: impl AsRef<Path>) -> PresetResult<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let preset = Self::from_json(&json)?;
        log::info!("Loaded groove preset {} from {:?}", preset.name, path.as_ref());
        Ok(preset)
    }

    /// Write the preset as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> PresetResult<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}

/// Which preset is active in which bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrooveTrack {
    pub default_preset: GroovePreset,

    /// Preset changes keyed by the first bar they apply to
    #[serde(default)]
    pub changes: BTreeMap<u32, GroovePreset>,
}

impl GrooveTrack {
    /// Same preset for every bar
    pub fn uniform(preset: GroovePreset) -> Self {
        GrooveTrack {
            default_preset: preset,
            changes: BTreeMap::new(),
        }
    }

    /// Switch to `preset` from `bar` onwards
    pub fn with_change(mut self, bar: u32, preset: GroovePreset) -> Self {
        self.changes.insert(bar, preset);
        self
    }

    /// Preset active in a bar: the latest change at or before it
    pub fn preset_for_bar(&self, bar: u32) -> &GroovePreset {
        self.changes
            .range(..=bar)
            .next_back()
            .map(|(_, preset)| preset)
            .unwrap_or(&self.default_preset)
    }

    /// Every preset the track can activate
    pub fn presets(&self) -> impl Iterator<Item = &GroovePreset> {
        std::iter::once(&self.default_preset).chain(self.changes.values())
    }
}

fn beats(values: impl IntoIterator<Item = f64>) -> Vec<BeatPosition> {
    values.into_iter().map(BeatPosition::new).collect()
}

/// Odd beats: 1 and 3 in 4/4, 1 and 3 in 3/4
fn odd_beats(beats_per_bar: u32) -> Vec<BeatPosition> {
    beats((1..=beats_per_bar).step_by(2).map(f64::from))
}

fn grid_beats(beats_per_bar: u32, per_beat: u32) -> Vec<BeatPosition> {
    let total = beats_per_bar * per_beat;
    beats((0..total).map(|i| 1.0 + i as f64 / per_beat as f64))
}

fn must_hit(positions: &[BeatPosition]) -> RoleProtectionSet {
    let mut set = RoleProtectionSet::new();
    for position in positions {
        set.insert(ProtectionKind::MustHit, *position);
    }
    set
}

/// Kick downbeat can never be filtered away at a section start
fn section_start_layer() -> ProtectionLayer {
    ProtectionLayer::new("section_start")
        .when(ActivationPredicate::AllOf(vec![TAG_SECTION_START.to_string()]))
        .with_role(
            DrumRole::Kick,
            RoleProtectionSet::new().with(ProtectionKind::NeverRemove, &[1.0]),
        )
}

fn pop_rock_basic(beats_per_bar: u32) -> GroovePreset {
    let backbeat = backbeats(beats_per_bar);

    let core = ProtectionLayer::new("pop_rock_core")
        .with_role(DrumRole::Kick, must_hit(&[BeatPosition::DOWNBEAT]))
        .with_role(
            DrumRole::Snare,
            must_hit(&backbeat).with(ProtectionKind::NeverAdd, &[1.0]),
        );

    GroovePreset {
        name: PresetId::PopRockBasic.to_str().to_string(),
        anchors: AnchorLayer {
            patterns: vec![
                AnchorPattern::new(DrumRole::Kick, odd_beats(beats_per_bar), 100),
                AnchorPattern::new(DrumRole::Snare, backbeat, 100),
                AnchorPattern::new(DrumRole::ClosedHat, grid_beats(beats_per_bar, 2), 80),
            ],
        },
        protection: ProtectionPolicy {
            layers: vec![core, section_start_layer()],
            subdivision: Some(
                SubdivisionPolicy::QUARTER | SubdivisionPolicy::EIGHTH | SubdivisionPolicy::SIXTEENTH,
            ),
            role_constraints: None,
            phrase_hook: Some(PhraseHookPolicy::default()),
        },
        orchestration: OrchestrationDefaults::default(),
    }
}

fn half_time(beats_per_bar: u32) -> GroovePreset {
    let middle = BeatPosition::new((beats_per_bar / 2 + 1) as f64);

    let core = ProtectionLayer::new("half_time_core")
        .with_role(DrumRole::Kick, must_hit(&[BeatPosition::DOWNBEAT]))
        .with_role(DrumRole::Snare, must_hit(&[middle]));

    GroovePreset {
        name: PresetId::HalfTime.to_str().to_string(),
        anchors: AnchorLayer {
            patterns: vec![
                AnchorPattern::new(DrumRole::Kick, vec![BeatPosition::DOWNBEAT], 100),
                AnchorPattern::new(DrumRole::Snare, vec![middle], 105),
                AnchorPattern::new(DrumRole::ClosedHat, grid_beats(beats_per_bar, 1), 75),
            ],
        },
        protection: ProtectionPolicy {
            layers: vec![core, section_start_layer()],
            subdivision: Some(SubdivisionPolicy::QUARTER | SubdivisionPolicy::EIGHTH),
            role_constraints: Some(
                RoleConstraintPolicy::new().with_role(DrumRole::Snare, RoleRhythmVocabulary::straight()),
            ),
            phrase_hook: Some(PhraseHookPolicy {
                protect_backbeat_on_phrase_end: true,
                ..PhraseHookPolicy::default()
            }),
        },
        orchestration: OrchestrationDefaults {
            operator_velocity_scale: 0.9,
            ..OrchestrationDefaults::default()
        },
    }
}

fn funk_sixteenths(beats_per_bar: u32) -> GroovePreset {
    let backbeat = backbeats(beats_per_bar);

    let core = ProtectionLayer::new("funk_core")
        .with_role(DrumRole::Kick, must_hit(&[BeatPosition::DOWNBEAT]))
        .with_role(DrumRole::Snare, must_hit(&backbeat));

    GroovePreset {
        name: PresetId::FunkSixteenths.to_str().to_string(),
        anchors: AnchorLayer {
            patterns: vec![
                AnchorPattern::new(DrumRole::Kick, vec![BeatPosition::DOWNBEAT], 100),
                AnchorPattern::new(DrumRole::Snare, backbeat, 100),
                AnchorPattern::new(DrumRole::ClosedHat, grid_beats(beats_per_bar, 4), 70),
            ],
        },
        protection: ProtectionPolicy {
            layers: vec![core],
            subdivision: Some(
                SubdivisionPolicy::QUARTER | SubdivisionPolicy::EIGHTH | SubdivisionPolicy::SIXTEENTH,
            ),
            role_constraints: Some(RoleConstraintPolicy::new().with_role(
                DrumRole::Kick,
                RoleRhythmVocabulary {
                    max_hits_per_beat: 2,
                    ..RoleRhythmVocabulary::default()
                },
            )),
            phrase_hook: Some(PhraseHookPolicy {
                allow_fills_at_phrase_end: true,
                ..PhraseHookPolicy::default()
            }),
        },
        orchestration: OrchestrationDefaults::default(),
    }
}

fn triplet_shuffle(beats_per_bar: u32) -> GroovePreset {
    let backbeat = backbeats(beats_per_bar);
    let hats = beats(
        (1..=beats_per_bar)
            .flat_map(|beat| [beat as f64, beat as f64 + 2.0 / 3.0]),
    );

    let core = ProtectionLayer::new("shuffle_core")
        .with_role(DrumRole::Kick, must_hit(&[BeatPosition::DOWNBEAT]))
        .with_role(DrumRole::Snare, must_hit(&backbeat));

    GroovePreset {
        name: PresetId::TripletShuffle.to_str().to_string(),
        anchors: AnchorLayer {
            patterns: vec![
                AnchorPattern::new(DrumRole::Kick, odd_beats(beats_per_bar), 100),
                AnchorPattern::new(DrumRole::Snare, backbeat, 100),
                AnchorPattern::new(DrumRole::ClosedHat, hats, 78),
            ],
        },
        protection: ProtectionPolicy {
            layers: vec![core, section_start_layer()],
            subdivision: Some(SubdivisionPolicy::QUARTER | SubdivisionPolicy::EIGHTH_TRIPLET),
            role_constraints: None,
            phrase_hook: Some(PhraseHookPolicy::default()),
        },
        orchestration: OrchestrationDefaults::default(),
    }
}

impl Default for GroovePreset {
    fn default() -> Self {
        PresetId::PopRockBasic.build(4)
    }
}
