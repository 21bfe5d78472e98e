// Protection Types - Layered, tag-gated onset protections
// Layers are plain records evaluated against a bar's enabled tags

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;

/// The four kinds of onset protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionKind {
    /// Position must be present in the final output
    MustHit,

    /// Position may not be removed once generated
    NeverRemove,

    /// Position may never be added by operators
    NeverAdd,

    /// Position is marked protected (informational flag on onsets)
    Protected,
}

impl ProtectionKind {
    pub const ALL: [ProtectionKind; 4] = [
        ProtectionKind::MustHit,
        ProtectionKind::NeverRemove,
        ProtectionKind::NeverAdd,
        ProtectionKind::Protected,
    ];
}

/// Protected positions for one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProtectionSet {
    #[serde(default)]
    pub must_hit: BTreeSet<BeatPosition>,

    #[serde(default)]
    pub never_remove: BTreeSet<BeatPosition>,

    #[serde(default)]
    pub never_add: BTreeSet<BeatPosition>,

    #[serde(default)]
    pub protected: BTreeSet<BeatPosition>,
}

impl RoleProtectionSet {
    /// Create an empty protection set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of several beats of one kind
    pub fn with(mut self, kind: ProtectionKind, beats: &[f64]) -> Self {
        for beat in beats {
            self.insert(kind, BeatPosition::new(*beat));
        }
        self
    }

    /// Positions of one kind
    pub fn positions(&self, kind: ProtectionKind) -> &BTreeSet<BeatPosition> {
        match kind {
            ProtectionKind::MustHit => &self.must_hit,
            ProtectionKind::NeverRemove => &self.never_remove,
            ProtectionKind::NeverAdd => &self.never_add,
            ProtectionKind::Protected => &self.protected,
        }
    }

    fn positions_mut(&mut self, kind: ProtectionKind) -> &mut BTreeSet<BeatPosition> {
        match kind {
            ProtectionKind::MustHit => &mut self.must_hit,
            ProtectionKind::NeverRemove => &mut self.never_remove,
            ProtectionKind::NeverAdd => &mut self.never_add,
            ProtectionKind::Protected => &mut self.protected,
        }
    }

    /// Insert a position; returns false if it was already present
    pub fn insert(&mut self, kind: ProtectionKind, position: BeatPosition) -> bool {
        self.positions_mut(kind).insert(position)
    }

    /// Check whether a position carries a protection kind
    pub fn contains(&self, kind: ProtectionKind, position: BeatPosition) -> bool {
        self.positions(kind).contains(&position)
    }

    /// Union another set into this one, kind by kind
    pub fn union_with(&mut self, other: &RoleProtectionSet) {
        for kind in ProtectionKind::ALL {
            self.positions_mut(kind)
                .extend(other.positions(kind).iter().copied());
        }
    }

    /// True when no kind holds any position
    pub fn is_empty(&self) -> bool {
        ProtectionKind::ALL
            .iter()
            .all(|kind| self.positions(*kind).is_empty())
    }
}

/// When a layer applies to a bar
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "tags", rename_all = "snake_case")]
pub enum ActivationPredicate {
    /// Active in every bar
    #[default]
    Always,

    /// Active when every listed tag is enabled
    AllOf(Vec<String>),

    /// Active when at least one listed tag is enabled
    AnyOf(Vec<String>),
}

impl ActivationPredicate {
    /// Evaluate against the tags enabled for a bar
    pub fn is_active(&self, enabled_tags: &BTreeSet<String>) -> bool {
        match self {
            ActivationPredicate::Always => true,
            ActivationPredicate::AllOf(tags) => tags.iter().all(|t| enabled_tags.contains(t)),
            ActivationPredicate::AnyOf(tags) => tags.iter().any(|t| enabled_tags.contains(t)),
        }
    }
}

/// A named, tag-gated set of role protections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionLayer {
    /// Layer name (for diagnostics)
    pub name: String,

    /// Activation predicate
    #[serde(default)]
    pub activation: ActivationPredicate,

    /// Exclusive layers replace a role's merged set instead of adding to it
    #[serde(default)]
    pub exclusive: bool,

    /// Protections per role
    #[serde(default)]
    pub roles: BTreeMap<DrumRole, RoleProtectionSet>,
}

impl ProtectionLayer {
    /// Create an always-active additive layer
    pub fn new(name: impl Into<String>) -> Self {
        ProtectionLayer {
            name: name.into(),
            activation: ActivationPredicate::Always,
            exclusive: false,
            roles: BTreeMap::new(),
        }
    }

    /// Set the activation predicate
    pub fn when(mut self, activation: ActivationPredicate) -> Self {
        self.activation = activation;
        self
    }

    /// Mark the layer exclusive
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Add protections for a role (unioned with any already given)
    pub fn with_role(mut self, role: DrumRole, set: RoleProtectionSet) -> Self {
        self.roles.entry(role).or_default().union_with(&set);
        self
    }
}

/// Protections for every role of one bar
pub type BarProtections = BTreeMap<DrumRole, RoleProtectionSet>;

/// Merged protections: bar -> role -> set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionMap {
    pub bars: BTreeMap<u32, BarProtections>,
}

impl ProtectionMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// All protections for a bar
    pub fn bar(&self, bar: u32) -> Option<&BarProtections> {
        self.bars.get(&bar)
    }

    /// Protections for one role in one bar
    pub fn role(&self, bar: u32, role: DrumRole) -> Option<&RoleProtectionSet> {
        self.bars.get(&bar).and_then(|roles| roles.get(&role))
    }

    /// Mutable set for a role in a bar, created if missing
    pub fn entry(&mut self, bar: u32, role: DrumRole) -> &mut RoleProtectionSet {
        self.bars.entry(bar).or_default().entry(role).or_default()
    }

    /// Replace the protections of a whole bar
    pub fn set_bar(&mut self, bar: u32, protections: BarProtections) {
        self.bars.insert(bar, protections);
    }

    /// Check whether a position carries a protection kind
    pub fn contains(
        &self,
        bar: u32,
        role: DrumRole,
        kind: ProtectionKind,
        position: BeatPosition,
    ) -> bool {
        self.role(bar, role)
            .map(|set| set.contains(kind, position))
            .unwrap_or(false)
    }
}
