// Subdivision Filter - Restricts onsets to the allowed rhythmic grids
// Tolerant of recurring-decimal beat positions via GRID_EPSILON

use crate::arranger::onset::Onset;
use super::grid::SubdivisionPolicy;

/// Keep only onsets whose beat position lies on an enabled grid
///
/// * `None` policy - every onset passes unchanged
/// * `SubdivisionPolicy::NONE` - the result is empty
/// * otherwise - an onset survives if it matches any enabled grid
pub fn filter_by_subdivision(
    onsets: &[Onset],
    policy: Option<&SubdivisionPolicy>,
    beats_per_bar: u32,
) -> Vec<Onset> {
    let Some(policy) = policy else {
        return onsets.to_vec();
    };

    if policy.is_none() {
        return Vec::new();
    }

    onsets
        .iter()
        .filter(|onset| onset.beat.is_within_bar(beats_per_bar) && policy.allows(onset.beat))
        .cloned()
        .collect()
}
