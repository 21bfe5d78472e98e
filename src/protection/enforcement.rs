// Protection Enforcement - Final authority over filtered operator onsets
// Must run after the subdivision and vocabulary filters so protected positions survive them

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::arranger::onset::{sort_onsets, Onset, OnsetKey};
use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;
use super::types::{ProtectionKind, ProtectionMap};

/// A position that is both MustHit and NeverAdd for the same role and bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionConflict {
    pub bar: u32,
    pub role: DrumRole,
    pub beat: BeatPosition,
}

/// Result of the enforcement pass
#[derive(Debug, Clone, Default)]
pub struct EnforcementOutcome {
    /// Onsets after enforcement, sorted by (bar, beat, role)
    pub onsets: Vec<Onset>,

    /// NeverRemove onsets restored after a filter dropped them
    pub restored: usize,

    /// NeverAdd onsets stripped
    pub stripped: usize,

    /// MustHit onsets synthesized
    pub synthesized: usize,

    /// MustHit/NeverAdd collisions (MustHit wins)
    pub conflicts: Vec<ProtectionConflict>,
}

/// Enforce protections on the operator onsets of one or more bars
///
/// 1. NeverRemove positions present in `pre_filter` but missing from
///    `survivors` are restored.
/// 2. NeverAdd positions are stripped, whatever their origin.
/// 3. Missing MustHit positions are synthesized at `default_velocity`.
///
/// Because MustHit is applied last it wins over NeverAdd; each such collision
/// is reported in `conflicts`. MustHit and NeverRemove onsets lose any
/// micro-timing offset.
pub fn enforce_protections(
    pre_filter: &[Onset],
    survivors: &[Onset],
    protections: &ProtectionMap,
    default_velocity: u8,
) -> EnforcementOutcome {
    let mut outcome = EnforcementOutcome::default();
    let mut onsets: Vec<Onset> = survivors.to_vec();
    let mut present: HashSet<OnsetKey> = onsets.iter().map(|o| o.key()).collect();

    for onset in pre_filter {
        let kept = protections.contains(onset.bar, onset.role, ProtectionKind::NeverRemove, onset.beat);
        if kept && present.insert(onset.key()) {
            onsets.push(onset.clone().with_never_remove());
            outcome.restored += 1;
        }
    }

    let before = onsets.len();
    onsets.retain(|onset| {
        !protections.contains(onset.bar, onset.role, ProtectionKind::NeverAdd, onset.beat)
    });
    outcome.stripped = before - onsets.len();
    present = onsets.iter().map(|o| o.key()).collect();

    for (bar, roles) in &protections.bars {
        for (role, set) in roles {
            for position in &set.must_hit {
                if set.never_add.contains(position) {
                    outcome.conflicts.push(ProtectionConflict {
                        bar: *bar,
                        role: *role,
                        beat: *position,
                    });
                }
                if present.insert((*bar, *position, *role)) {
                    onsets.push(Onset::protection(*role, *bar, *position, default_velocity));
                    outcome.synthesized += 1;
                }
            }
        }
    }

    let flagged: Vec<Onset> = onsets
        .into_iter()
        .map(|mut onset| {
            if let Some(set) = protections.role(onset.bar, onset.role) {
                onset.must_hit |= set.contains(ProtectionKind::MustHit, onset.beat);
                onset.never_remove |= set.contains(ProtectionKind::NeverRemove, onset.beat);
                onset.protected |= set.contains(ProtectionKind::Protected, onset.beat)
                    || onset.must_hit
                    || onset.never_remove;
            }
            // Protected positions sound on their grid tick
            if onset.must_hit || onset.never_remove {
                onset.timing_offset_ticks = 0;
            }
            onset
        })
        .collect();

    outcome.onsets = flagged;
    sort_onsets(&mut outcome.onsets);
    outcome
}
