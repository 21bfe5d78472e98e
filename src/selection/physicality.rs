// Physicality - Can one drummer actually play this?
// Two hands and two feet per position; each foot owns one role

use std::collections::{HashMap, HashSet};

use crate::arranger::onset::Onset;
use crate::arranger::roles::{DrumRole, Limb};
use crate::groove::position::BeatPosition;

/// Default number of hand-played hits at one position
pub const DEFAULT_MAX_HANDS: u32 = 2;

/// Limb usage for one bar
#[derive(Debug, Clone)]
pub struct LimbUsage {
    enabled: bool,
    max_hands: u32,
    hands: HashMap<BeatPosition, u32>,
    feet: HashSet<(BeatPosition, Limb)>,
}

impl LimbUsage {
    /// Track limbs with a hand limit
    pub fn new(max_hands: u32) -> Self {
        LimbUsage {
            enabled: true,
            max_hands,
            hands: HashMap::new(),
            feet: HashSet::new(),
        }
    }

    /// Accept everything
    pub fn unlimited() -> Self {
        LimbUsage {
            enabled: false,
            ..Self::new(u32::MAX)
        }
    }

    /// Usage pre-loaded with existing onsets (typically the bar's anchors)
    pub fn from_onsets(onsets: &[Onset], max_hands: u32) -> Self {
        let mut usage = Self::new(max_hands);
        for onset in onsets {
            usage.record(onset.role, onset.beat);
        }
        usage
    }

    /// Turn checking off while still recording
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether `role` can still be played at `beat`
    pub fn can_play(&self, role: DrumRole, beat: BeatPosition) -> bool {
        if !self.enabled {
            return true;
        }
        match role.limb() {
            Limb::Hands => self.hands.get(&beat).copied().unwrap_or(0) < self.max_hands,
            foot => !self.feet.contains(&(beat, foot)),
        }
    }

    /// Mark `role` as played at `beat`
    pub fn record(&mut self, role: DrumRole, beat: BeatPosition) {
        match role.limb() {
            Limb::Hands => *self.hands.entry(beat).or_insert(0) += 1,
            foot => {
                self.feet.insert((beat, foot));
            }
        }
    }

    /// Hands already busy at `beat`
    pub fn hands_at(&self, beat: BeatPosition) -> u32 {
        self.hands.get(&beat).copied().unwrap_or(0)
    }
}
