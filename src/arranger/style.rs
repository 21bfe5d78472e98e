// Style Configuration - Which operators run and how dense each role may get
// Style biases nudge velocity and timing of operator onsets; anchors are left alone

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::operators::types::OnsetStrength;
use super::roles::DrumRole;

/// Playing style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleId {
    #[default]
    PopRock,
    Funk,
    Jazz,
    Metal,
    HipHop,
}

impl StyleId {
    pub const ALL: [StyleId; 5] = [
        StyleId::PopRock,
        StyleId::Funk,
        StyleId::Jazz,
        StyleId::Metal,
        StyleId::HipHop,
    ];

    /// Convert from string representation
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pop_rock" | "poprock" | "rock" => Some(StyleId::PopRock),
            "funk" => Some(StyleId::Funk),
            "jazz" => Some(StyleId::Jazz),
            "metal" => Some(StyleId::Metal),
            "hip_hop" | "hiphop" => Some(StyleId::HipHop),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            StyleId::PopRock => "pop_rock",
            StyleId::Funk => "funk",
            StyleId::Jazz => "jazz",
            StyleId::Metal => "metal",
            StyleId::HipHop => "hip_hop",
        }
    }

    /// Velocity nudge for an onset of the given strength
    pub fn velocity_bias(&self, strength: OnsetStrength) -> i16 {
        use OnsetStrength::*;
        match (self, strength) {
            (StyleId::PopRock, Backbeat) => 4,
            (StyleId::PopRock, _) => 0,
            (StyleId::Funk, Backbeat) => 6,
            (StyleId::Funk, Offbeat | Pickup) => -6,
            (StyleId::Funk, Downbeat) => 2,
            (StyleId::Jazz, Downbeat | Backbeat) => -8,
            (StyleId::Jazz, Offbeat | Pickup) => -4,
            (StyleId::Metal, _) => 8,
            (StyleId::HipHop, Backbeat) => 6,
            (StyleId::HipHop, Offbeat | Pickup) => -4,
            (StyleId::HipHop, Downbeat) => 0,
        }
    }

    /// Micro-timing nudge in ticks (positive = late) at 480 PPQ
    pub fn timing_bias_ticks(&self, strength: OnsetStrength) -> i32 {
        use OnsetStrength::*;
        match (self, strength) {
            (StyleId::HipHop, Offbeat | Pickup) => 12,
            (StyleId::HipHop, Backbeat) => 6,
            (StyleId::Jazz, Offbeat) => 8,
            (StyleId::Funk, Pickup) => -4,
            _ => 0,
        }
    }
}

/// Which operators may run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "operators", rename_all = "snake_case")]
pub enum OperatorAllowList {
    /// Every registered operator
    #[default]
    All,

    /// Only the listed operator ids
    Only(BTreeSet<String>),

    /// Everything except the listed operator ids
    Except(BTreeSet<String>),
}

impl OperatorAllowList {
    /// An allow-list that disables every operator
    pub fn none() -> Self {
        OperatorAllowList::Only(BTreeSet::new())
    }

    /// Allow only the given ids
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OperatorAllowList::Only(ids.into_iter().map(Into::into).collect())
    }

    /// Check whether an operator id may run
    pub fn allows(&self, operator_id: &str) -> bool {
        match self {
            OperatorAllowList::All => true,
            OperatorAllowList::Only(ids) => ids.contains(operator_id),
            OperatorAllowList::Except(ids) => !ids.contains(operator_id),
        }
    }
}

/// Style-level generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Playing style
    pub style: StyleId,

    /// Operators allowed to contribute candidates
    #[serde(default)]
    pub allow_list: OperatorAllowList,

    /// Max hits per bar per role, anchors included
    #[serde(default)]
    pub role_caps: BTreeMap<DrumRole, u32>,

    /// Added hits per beat per role
    #[serde(default)]
    pub role_densities: BTreeMap<DrumRole, f64>,

    /// Cap for roles without an explicit entry
    pub default_cap: u32,

    /// Density for roles without an explicit entry
    pub default_density: f64,

    /// Reject selections a drummer's limbs could not play
    pub physicality: bool,

    /// Hand-played hits allowed at one position
    pub max_hands_per_position: u32,

    /// Apply the style's velocity/timing biases to operator onsets
    pub apply_style_bias: bool,
}

impl StyleConfig {
    /// Default settings for a style
    pub fn for_style(style: StyleId) -> Self {
        let mut densities = BTreeMap::new();
        densities.insert(DrumRole::Kick, 0.25);
        densities.insert(DrumRole::Snare, 0.5);
        densities.insert(DrumRole::ClosedHat, 0.5);
        densities.insert(DrumRole::OpenHat, 0.25);
        densities.insert(DrumRole::Crash, 0.25);
        densities.insert(DrumRole::Ride, 1.0);
        densities.insert(DrumRole::SideStick, 0.5);
        densities.insert(DrumRole::PedalHat, 0.5);

        match style {
            StyleId::Funk => {
                densities.insert(DrumRole::Snare, 1.0);
                densities.insert(DrumRole::Kick, 0.5);
            }
            StyleId::Metal => {
                densities.insert(DrumRole::Kick, 1.0);
            }
            StyleId::Jazz => {
                densities.insert(DrumRole::Ride, 1.0);
                densities.insert(DrumRole::Kick, 0.0);
            }
            StyleId::HipHop => {
                densities.insert(DrumRole::ClosedHat, 0.75);
            }
            StyleId::PopRock => {}
        }

        let mut caps = BTreeMap::new();
        caps.insert(DrumRole::Kick, 8);
        caps.insert(DrumRole::Snare, 8);
        caps.insert(DrumRole::ClosedHat, 16);
        caps.insert(DrumRole::Crash, 2);
        caps.insert(DrumRole::OpenHat, 4);
        caps.insert(DrumRole::Ride, 12);
        if style == StyleId::Metal {
            caps.insert(DrumRole::Kick, 16);
        }

        StyleConfig {
            style,
            allow_list: OperatorAllowList::All,
            role_caps: caps,
            role_densities: densities,
            default_cap: 4,
            default_density: 1.0,
            physicality: true,
            max_hands_per_position: 2,
            apply_style_bias: true,
        }
    }

    /// Settings with every operator disabled (anchors only)
    pub fn anchors_only(style: StyleId) -> Self {
        StyleConfig {
            allow_list: OperatorAllowList::none(),
            ..Self::for_style(style)
        }
    }

    /// Builder: replace the allow-list
    pub fn with_allow_list(mut self, allow_list: OperatorAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Builder: set a role's cap
    pub fn with_cap(mut self, role: DrumRole, cap: u32) -> Self {
        self.role_caps.insert(role, cap);
        self
    }

    /// Builder: set a role's density
    pub fn with_density(mut self, role: DrumRole, density: f64) -> Self {
        self.role_densities.insert(role, density);
        self
    }

    /// Cap for a role
    pub fn cap_for(&self, role: DrumRole) -> u32 {
        self.role_caps.get(&role).copied().unwrap_or(self.default_cap)
    }

    /// Density for a role, clamped to [0, 1]; denser playing comes from the role cap
    pub fn density_for(&self, role: DrumRole) -> f64 {
        let density = self
            .role_densities
            .get(&role)
            .copied()
            .unwrap_or(self.default_density);
        if density.is_finite() {
            density.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self::for_style(StyleId::PopRock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_from_string() {
        assert_eq!(StyleId::from_string("hip_hop"), Some(StyleId::HipHop));
        assert_eq!(StyleId::from_string("Funk"), Some(StyleId::Funk));
        assert_eq!(StyleId::from_string("polka"), None);
        for style in StyleId::ALL {
            assert_eq!(StyleId::from_string(style.to_str()), Some(style));
        }
    }

    #[test]
    fn test_hip_hop_lays_back_offbeats() {
        assert!(StyleId::HipHop.timing_bias_ticks(OnsetStrength::Offbeat) > 0);
        assert_eq!(StyleId::PopRock.timing_bias_ticks(OnsetStrength::Offbeat), 0);
    }

    #[test]
    fn test_allow_list() {
        assert!(OperatorAllowList::All.allows("crash_on_one"));
        assert!(!OperatorAllowList::none().allows("crash_on_one"));

        let only = OperatorAllowList::only(["crash_on_one"]);
        assert!(only.allows("crash_on_one"));
        assert!(!only.allows("hat_lift"));

        let except = OperatorAllowList::Except(["hat_lift".to_string()].into_iter().collect());
        assert!(except.allows("crash_on_one"));
        assert!(!except.allows("hat_lift"));
    }

    #[test]
    fn test_caps_and_densities() {
        let config = StyleConfig::for_style(StyleId::Metal)
            .with_density(DrumRole::Snare, -1.0)
            .with_cap(DrumRole::TomHigh, 6);

        assert_eq!(config.cap_for(DrumRole::Kick), 16);
        assert_eq!(config.cap_for(DrumRole::TomHigh), 6);
        assert_eq!(config.cap_for(DrumRole::FloorTom), config.default_cap);
        assert_eq!(config.density_for(DrumRole::Snare), 0.0);
    }

    #[test]
    fn test_densities_stay_within_one_hit_per_beat() {
        for style in StyleId::ALL {
            let config = StyleConfig::for_style(style);
            for role in DrumRole::ALL {
                let density = config.density_for(role);
                assert!((0.0..=1.0).contains(&density), "{:?} {:?} {}", style, role, density);
            }
        }

        let config = StyleConfig::for_style(StyleId::Jazz).with_density(DrumRole::Ride, 1.5);
        assert_eq!(config.density_for(DrumRole::Ride), 1.0);
        assert_eq!(config.cap_for(DrumRole::Ride), 12);
    }

    #[test]
    fn test_style_config_json() {
        let config = StyleConfig::anchors_only(StyleId::Jazz);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StyleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(!parsed.allow_list.allows("ride_swap"));
    }
}
