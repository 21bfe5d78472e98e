// Onset Combiner - Lays enforced operator onsets over the anchor pattern
// One onset per (bar, beat, role); an anchor always beats an operator hit

use std::collections::BTreeMap;

use super::onset::{Onset, OnsetKey};

/// Merge anchors and operator onsets, sorted by (bar, beat, role)
///
/// When an operator onset lands on an anchor's key the anchor is kept and the
/// operator onset dropped. Duplicate operator onsets keep the first one.
pub fn combine_onsets(anchors: &[Onset], operator_onsets: &[Onset]) -> Vec<Onset> {
    let mut combined: BTreeMap<OnsetKey, Onset> = BTreeMap::new();

    for onset in anchors {
        combined.entry(onset.key()).or_insert_with(|| onset.clone());
    }

    let mut shadowed = 0usize;
    for onset in operator_onsets {
        if combined.contains_key(&onset.key()) {
            shadowed += 1;
            continue;
        }
        combined.insert(onset.key(), onset.clone());
    }

    if shadowed > 0 {
        log::debug!("{} operator onsets shadowed by existing hits", shadowed);
    }

    combined.into_values().collect()
}
