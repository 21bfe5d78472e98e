// Syncopation Filter - Per-role rhythm vocabulary enforcement
// Drops offbeat ("and") and pickup ("a") onsets for roles that disallow them

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::arranger::onset::Onset;
use crate::arranger::roles::DrumRole;
use super::position::{BeatPosition, GRID_EPSILON};

/// Rhythmic vocabulary allowed for a single role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRhythmVocabulary {
    /// Allow onsets on the "and" (fraction 0.5)
    pub allow_syncopation: bool,

    /// Allow pickups on the "a" before the next beat (fraction 0.75)
    pub allow_anticipation: bool,

    /// Maximum hits per bar (0 = unlimited)
    #[serde(default)]
    pub max_hits_per_bar: u32,

    /// Maximum hits within one beat (0 = unlimited)
    #[serde(default)]
    pub max_hits_per_beat: u32,
}

impl Default for RoleRhythmVocabulary {
    fn default() -> Self {
        RoleRhythmVocabulary {
            allow_syncopation: true,
            allow_anticipation: true,
            max_hits_per_bar: 0,
            max_hits_per_beat: 0,
        }
    }
}

impl RoleRhythmVocabulary {
    /// Vocabulary that only permits on-beat and non-syncopated positions
    pub fn straight() -> Self {
        RoleRhythmVocabulary {
            allow_syncopation: false,
            allow_anticipation: false,
            ..Default::default()
        }
    }
}

/// Per-role rhythm vocabularies for a groove
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConstraintPolicy {
    pub vocabularies: BTreeMap<DrumRole, RoleRhythmVocabulary>,
}

impl RoleConstraintPolicy {
    /// Create an empty policy (every role unconstrained)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style vocabulary assignment
    pub fn with_role(mut self, role: DrumRole, vocabulary: RoleRhythmVocabulary) -> Self {
        self.vocabularies.insert(role, vocabulary);
        self
    }

    /// Vocabulary for a role, if one is configured
    pub fn vocabulary(&self, role: DrumRole) -> Option<&RoleRhythmVocabulary> {
        self.vocabularies.get(&role)
    }
}

/// Rhythmic classification of a position within its beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffbeatKind {
    /// Fraction ~0.5
    Offbeat,

    /// Fraction ~0.75
    Pickup,

    /// Anything else (on-beat, "e", triplets)
    Other,
}

/// Classify a beat position as offbeat, pickup or neither
pub fn classify_offbeat(position: BeatPosition) -> OffbeatKind {
    if position.fraction_near(0.5, GRID_EPSILON) {
        OffbeatKind::Offbeat
    } else if position.fraction_near(0.75, GRID_EPSILON) {
        OffbeatKind::Pickup
    } else {
        OffbeatKind::Other
    }
}

/// Apply per-role syncopation/anticipation rules and hit caps
///
/// A `None` policy passes everything. Roles without a vocabulary keep all
/// onsets. When hit caps are set, the earliest onsets in each bar win.
pub fn filter_by_role_vocabulary(
    onsets: &[Onset],
    policy: Option<&RoleConstraintPolicy>,
    beats_per_bar: u32,
) -> Vec<Onset> {
    let Some(policy) = policy else {
        return onsets.to_vec();
    };

    let vocabulary_allows = |onset: &Onset| -> bool {
        let Some(vocabulary) = policy.vocabulary(onset.role) else {
            return true;
        };
        match classify_offbeat(onset.beat) {
            OffbeatKind::Offbeat => vocabulary.allow_syncopation,
            OffbeatKind::Pickup => vocabulary.allow_anticipation,
            OffbeatKind::Other => true,
        }
    };

    let survivors: Vec<&Onset> = onsets.iter().filter(|o| vocabulary_allows(*o)).collect();

    // Caps are applied earliest-first, then the input order is restored
    let mut order: Vec<usize> = (0..survivors.len()).collect();
    order.sort_by_key(|&i| survivors[i].key());

    let mut per_bar: HashMap<(u32, DrumRole), u32> = HashMap::new();
    let mut per_beat: HashMap<(u32, DrumRole, u32), u32> = HashMap::new();
    let mut keep = vec![true; survivors.len()];

    for i in order {
        let onset = survivors[i];
        let Some(vocabulary) = policy.vocabulary(onset.role) else {
            continue;
        };

        let bar_count = per_bar.entry((onset.bar, onset.role)).or_insert(0);
        let beat_index = onset.beat.beat_number().min(beats_per_bar.max(1));
        let beat_count = per_beat
            .entry((onset.bar, onset.role, beat_index))
            .or_insert(0);

        let bar_full = vocabulary.max_hits_per_bar > 0 && *bar_count >= vocabulary.max_hits_per_bar;
        let beat_full =
            vocabulary.max_hits_per_beat > 0 && *beat_count >= vocabulary.max_hits_per_beat;

        if bar_full || beat_full {
            keep[i] = false;
        } else {
            *bar_count += 1;
            *beat_count += 1;
        }
    }

    survivors
        .into_iter()
        .zip(keep)
        .filter(|(_, kept)| *kept)
        .map(|(onset, _)| onset.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onset(role: DrumRole, beat: f64) -> Onset {
        Onset::anchor(role, 1, BeatPosition::new(beat), 90)
    }

    #[test]
    fn test_classify_offbeat() {
        assert_eq!(classify_offbeat(BeatPosition::new(2.5)), OffbeatKind::Offbeat);
        assert_eq!(classify_offbeat(BeatPosition::new(2.75)), OffbeatKind::Pickup);
        assert_eq!(classify_offbeat(BeatPosition::new(2.0)), OffbeatKind::Other);
        assert_eq!(classify_offbeat(BeatPosition::new(2.25)), OffbeatKind::Other);
        assert_eq!(classify_offbeat(BeatPosition::new(2.3333333)), OffbeatKind::Other);
    }

    #[test]
    fn test_missing_policy_passes() {
        let onsets = vec![onset(DrumRole::Kick, 1.5), onset(DrumRole::Kick, 2.75)];
        assert_eq!(filter_by_role_vocabulary(&onsets, None, 4).len(), 2);
    }

    #[test]
    fn test_role_without_vocabulary_keeps_all() {
        let policy = RoleConstraintPolicy::new().with_role(DrumRole::Kick, RoleRhythmVocabulary::straight());
        let onsets = vec![onset(DrumRole::Snare, 1.5), onset(DrumRole::Snare, 2.75)];
        assert_eq!(filter_by_role_vocabulary(&onsets, Some(&policy), 4).len(), 2);
    }

    #[test]
    fn test_syncopation_disallowed_drops_offbeats() {
        let vocabulary = RoleRhythmVocabulary {
            allow_syncopation: false,
            allow_anticipation: true,
            ..Default::default()
        };
        let policy = RoleConstraintPolicy::new().with_role(DrumRole::Kick, vocabulary);
        let onsets = vec![
            onset(DrumRole::Kick, 1.0),
            onset(DrumRole::Kick, 1.5),
            onset(DrumRole::Kick, 2.75),
            onset(DrumRole::Kick, 3.25),
        ];

        let filtered = filter_by_role_vocabulary(&onsets, Some(&policy), 4);
        let beats: Vec<f64> = filtered.iter().map(|o| o.beat.value()).collect();
        assert_eq!(beats, vec![1.0, 2.75, 3.25]);
    }

    #[test]
    fn test_anticipation_disallowed_drops_pickups() {
        let vocabulary = RoleRhythmVocabulary {
            allow_syncopation: true,
            allow_anticipation: false,
            ..Default::default()
        };
        let policy = RoleConstraintPolicy::new().with_role(DrumRole::Snare, vocabulary);
        let onsets = vec![onset(DrumRole::Snare, 1.5), onset(DrumRole::Snare, 1.75)];

        let filtered = filter_by_role_vocabulary(&onsets, Some(&policy), 4);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].beat, BeatPosition::new(1.5));
    }

    #[test]
    fn test_hit_caps_keep_earliest() {
        let vocabulary = RoleRhythmVocabulary {
            max_hits_per_bar: 3,
            max_hits_per_beat: 1,
            ..Default::default()
        };
        let policy = RoleConstraintPolicy::new().with_role(DrumRole::Kick, vocabulary);
        let onsets = vec![
            onset(DrumRole::Kick, 3.0),
            onset(DrumRole::Kick, 1.0),
            onset(DrumRole::Kick, 1.5),
            onset(DrumRole::Kick, 2.0),
            onset(DrumRole::Kick, 4.0),
        ];

        let filtered = filter_by_role_vocabulary(&onsets, Some(&policy), 4);
        let beats: Vec<f64> = filtered.iter().map(|o| o.beat.value()).collect();
        // Input order is preserved; 1.5 shares beat 1 and 4.0 exceeds the bar cap
        assert_eq!(beats, vec![3.0, 1.0, 2.0]);
    }
}
