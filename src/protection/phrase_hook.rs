// Phrase Hooks - Cadential protection near section ends
// Adds downbeat/backbeat NeverRemove entries inside the phrase-end window

use serde::{Deserialize, Serialize};

use crate::arranger::roles::DrumRole;
use crate::groove::grid::backbeats;
use crate::groove::position::BeatPosition;
use crate::song::BarContext;
use super::types::{ProtectionKind, ProtectionMap};

/// Protection rules applied to the last bars of each section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseHookPolicy {
    /// Keep beat 1 in the window
    pub protect_downbeat_on_phrase_end: bool,

    /// Keep every backbeat in the window
    pub protect_backbeat_on_phrase_end: bool,

    /// Size of the window in bars (the last N bars of a section)
    pub phrase_end_bars_window: u32,

    /// When fills are allowed at the boundary nothing is protected
    pub allow_fills_at_phrase_end: bool,
}

impl Default for PhraseHookPolicy {
    fn default() -> Self {
        PhraseHookPolicy {
            protect_downbeat_on_phrase_end: true,
            protect_backbeat_on_phrase_end: false,
            phrase_end_bars_window: 1,
            allow_fills_at_phrase_end: false,
        }
    }
}

/// Positions a policy protects, or none when fills are allowed at the boundary
fn hook_positions(policy: &PhraseHookPolicy, beats_per_bar: u32) -> Vec<BeatPosition> {
    let mut positions = Vec::new();
    if policy.allow_fills_at_phrase_end {
        return positions;
    }
    if policy.protect_downbeat_on_phrase_end {
        positions.push(BeatPosition::DOWNBEAT);
    }
    if policy.protect_backbeat_on_phrase_end {
        positions.extend(backbeats(beats_per_bar));
    }
    positions
}

/// Augment a single bar in place
///
/// Every kit role is augmented, including roles only operators play; bars
/// without a section are never touched.
pub fn augment_bar(
    protections: &mut ProtectionMap,
    context: &BarContext,
    policy: Option<&PhraseHookPolicy>,
    beats_per_bar: u32,
) {
    let Some(policy) = policy else {
        return;
    };
    if !context.in_section_end_window(policy.phrase_end_bars_window) {
        return;
    }

    let positions = hook_positions(policy, beats_per_bar);
    if positions.is_empty() {
        return;
    }

    for role in DrumRole::ALL {
        let set = protections.entry(context.bar, role);
        for position in &positions {
            set.insert(ProtectionKind::NeverRemove, *position);
        }
    }
}

/// Add phrase-end protections to a merged map
///
/// Returns the input unchanged when the policy is absent.
pub fn augment_phrase_hooks(
    protections: &ProtectionMap,
    contexts: &[BarContext],
    policy: Option<&PhraseHookPolicy>,
    beats_per_bar: u32,
) -> ProtectionMap {
    let mut augmented = protections.clone();
    for context in contexts {
        augment_bar(&mut augmented, context, policy, beats_per_bar);
    }
    augmented
}
