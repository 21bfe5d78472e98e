// Selection - From operator candidates to chosen onsets
// Validation, grouping, memory-aware weighting and limb limits

pub mod mapper;
pub mod memory;
pub mod physicality;
pub mod engine;

pub use mapper::{
    group_candidates, map_candidates, CandidateGroup, MappedCandidates, OnsetCandidate,
    RejectedCandidate, RejectionReason,
};
pub use memory::{
    AntiRepetitionMemory, ChorusCrashPattern, DecayCurve, FillShape, HatMode, MemoryConfig,
    MemoryError, DEFAULT_MEMORY_WINDOW,
};
pub use physicality::{LimbUsage, DEFAULT_MAX_HANDS};
pub use engine::{role_rng, BarSelectionState, SelectedCandidate, SelectionEngine, SelectionRequest};
