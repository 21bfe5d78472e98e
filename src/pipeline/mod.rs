// Pipeline execution and monitoring module
// Orchestrates a full drum generation run and records what it tolerated

pub mod diagnostics;
pub mod fingerprint;
pub mod generator;
pub mod trace;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use fingerprint::fingerprint_events;
pub use generator::{DrumGenerator, DrumTrack, GenerationConfig, GenerationError};
pub use trace::{entries_for_run, read_trace_file, TraceEntry, TraceError, TraceStage, TraceWriter};
