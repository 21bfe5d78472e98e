// Protection Merger - Resolves a stack of tag-gated layers per bar
// Additive layers union per protection kind; exclusive layers replace a role's set

use std::collections::BTreeSet;

use crate::song::BarContext;
use super::tags::TagProfile;
use super::types::{BarProtections, ProtectionLayer, ProtectionMap};

/// Merge layers for one bar given its enabled tags
///
/// Layers are visited in order. For additive layers the result does not depend
/// on that order; an exclusive layer overwrites the roles it names, so layers
/// after it add on top of its sets.
pub fn merge_bar_layers(layers: &[ProtectionLayer], enabled_tags: &BTreeSet<String>) -> BarProtections {
    let mut merged = BarProtections::new();

    for layer in layers {
        if !layer.activation.is_active(enabled_tags) {
            continue;
        }

        for (role, set) in &layer.roles {
            if layer.exclusive {
                merged.insert(*role, set.clone());
            } else {
                merged.entry(*role).or_default().union_with(set);
            }
        }
    }

    merged
}

/// Merge one layer stack for every bar of the song
pub fn merge_protection_layers(
    layers: &[ProtectionLayer],
    contexts: &[BarContext],
    tag_profile: &TagProfile,
) -> ProtectionMap {
    let mut map = ProtectionMap::new();

    for context in contexts {
        let tags = tag_profile.enabled_tags(context);
        let merged = merge_bar_layers(layers, &tags);
        log::debug!(
            "Bar {}: {} protected roles from {} layers",
            context.bar,
            merged.len(),
            layers.len()
        );
        map.set_bar(context.bar, merged);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::roles::DrumRole;
    use crate::groove::position::BeatPosition;
    use crate::protection::types::{ActivationPredicate, ProtectionKind, RoleProtectionSet};
    use crate::song::{build_bar_contexts, SectionType, SongStructure};

    fn must_hit(beats: &[f64]) -> RoleProtectionSet {
        RoleProtectionSet::new().with(ProtectionKind::MustHit, beats)
    }

    fn verse_chorus() -> Vec<BarContext> {
        let song = SongStructure::sequential(&[(SectionType::Verse, 2), (SectionType::Chorus, 2)]);
        build_bar_contexts(&song, 4)
    }

    #[test]
    fn test_additive_union() {
        let layers = vec![
            ProtectionLayer::new("base").with_role(DrumRole::Kick, must_hit(&[1.0])),
            ProtectionLayer::new("extra").with_role(DrumRole::Kick, must_hit(&[3.0])),
        ];
        let map = merge_protection_layers(&layers, &verse_chorus(), &TagProfile::new());

        let kick = map.role(1, DrumRole::Kick).unwrap();
        assert_eq!(kick.must_hit.len(), 2);
    }

    #[test]
    fn test_additive_order_independent() {
        let a = ProtectionLayer::new("a").with_role(
            DrumRole::Snare,
            must_hit(&[2.0]).with(ProtectionKind::NeverAdd, &[2.75]),
        );
        let b = ProtectionLayer::new("b").with_role(DrumRole::Snare, must_hit(&[4.0]));

        let contexts = verse_chorus();
        let forward = merge_protection_layers(&[a.clone(), b.clone()], &contexts, &TagProfile::new());
        let backward = merge_protection_layers(&[b, a], &contexts, &TagProfile::new());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_tag_gating() {
        let layers = vec![ProtectionLayer::new("chorus_crash")
            .when(ActivationPredicate::AllOf(vec!["chorus".into(), "section_start".into()]))
            .with_role(DrumRole::Crash, must_hit(&[1.0]))];
        let map = merge_protection_layers(&layers, &verse_chorus(), &TagProfile::new());

        assert!(map.role(1, DrumRole::Crash).is_none());
        assert!(map.role(2, DrumRole::Crash).is_none());
        assert!(map.contains(3, DrumRole::Crash, ProtectionKind::MustHit, BeatPosition::new(1.0)));
        assert!(map.role(4, DrumRole::Crash).is_none());
    }

    #[test]
    fn test_exclusive_layer_replaces_in_order() {
        let base = ProtectionLayer::new("base").with_role(DrumRole::Kick, must_hit(&[1.0, 3.0]));
        let sparse = ProtectionLayer::new("sparse")
            .exclusive()
            .with_role(DrumRole::Kick, must_hit(&[1.0]));
        let later = ProtectionLayer::new("later").with_role(DrumRole::Kick, must_hit(&[2.5]));

        let tags = BTreeSet::new();
        let merged = merge_bar_layers(&[base.clone(), sparse.clone(), later], &tags);
        let beats: Vec<f64> = merged[&DrumRole::Kick].must_hit.iter().map(|b| b.value()).collect();
        assert_eq!(beats, vec![1.0, 2.5]);

        // Exclusive first, additive after: the additive layer extends it
        let merged = merge_bar_layers(&[sparse, base], &tags);
        assert_eq!(merged[&DrumRole::Kick].must_hit.len(), 2);
    }

    #[test]
    fn test_exclusive_only_touches_named_roles() {
        let base = ProtectionLayer::new("base")
            .with_role(DrumRole::Kick, must_hit(&[1.0]))
            .with_role(DrumRole::Snare, must_hit(&[2.0, 4.0]));
        let override_snare = ProtectionLayer::new("halftime")
            .exclusive()
            .with_role(DrumRole::Snare, must_hit(&[3.0]));

        let merged = merge_bar_layers(&[base, override_snare], &BTreeSet::new());
        assert_eq!(merged[&DrumRole::Kick].must_hit.len(), 1);
        assert_eq!(merged[&DrumRole::Snare].must_hit.len(), 1);
    }
}
