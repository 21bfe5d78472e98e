// Arranger - Drum kit, grooves and the final onset-to-event stages
// Anchors come from presets; combined onsets become ticks and MIDI

pub mod roles;
pub mod onset;
pub mod style;
pub mod presets;
pub mod combiner;
pub mod materialize;
pub mod midi;

// Re-export main types
pub use roles::{DrumRole, Limb};
pub use onset::{sort_onsets, Onset, OnsetKey, OnsetSource, DEFAULT_VELOCITY};
pub use style::{OperatorAllowList, StyleConfig, StyleId};
pub use presets::{
    AnchorLayer, AnchorPattern, GroovePreset, GrooveTrack, OrchestrationDefaults, PresetError,
    PresetId, ProtectionPolicy,
};
pub use combiner::combine_onsets;
pub use materialize::{materialize_events, DrumEvent, DEFAULT_NOTE_DURATION};
pub use midi::{export_drum_midi, write_drum_midi, ExportError, MidiExportOptions};
