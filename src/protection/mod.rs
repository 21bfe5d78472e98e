// Protection - Layered onset protections and their enforcement
// Merge per bar, augment phrase ends, enforce after filtering

pub mod types;
pub mod tags;
pub mod merger;
pub mod phrase_hook;
pub mod enforcement;

pub use types::{
    ActivationPredicate, BarProtections, ProtectionKind, ProtectionLayer, ProtectionMap,
    RoleProtectionSet,
};
pub use tags::{TagProfile, TAG_PHRASE_END, TAG_SECTION_END, TAG_SECTION_START, TAG_UNSECTIONED};
pub use merger::{merge_bar_layers, merge_protection_layers};
pub use phrase_hook::{augment_bar, augment_phrase_hooks, PhraseHookPolicy};
pub use enforcement::{enforce_protections, EnforcementOutcome, ProtectionConflict};
