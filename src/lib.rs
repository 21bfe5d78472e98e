// Backbeat - Rule-governed drum part generator
// Module declarations

pub mod arranger;
pub mod groove;
pub mod operators;
pub mod pipeline;
pub mod protection;
pub mod selection;
pub mod song;

// Re-export the generation entry points
pub use arranger::{
    export_drum_midi, DrumEvent, DrumRole, GroovePreset, GrooveTrack, MidiExportOptions, Onset,
    PresetId, StyleConfig, StyleId,
};
pub use groove::{BeatPosition, TimeSignature};
pub use pipeline::{DrumGenerator, DrumTrack, GenerationConfig, GenerationError};
pub use song::{Section, SectionType, SongStructure};
