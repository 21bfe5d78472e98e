// Operators - Rule-based candidate generators
// Five families behind one trait, registered in a fixed order

pub mod types;
pub mod micro_addition;
pub mod subdivision_transform;
pub mod phrase_punctuation;
pub mod pattern_substitution;
pub mod style_idiom;
pub mod registry;

pub use types::{
    DrumCandidate, DrumOperator, FillRole, OnsetStrength, OperatorContext, OperatorError,
    OperatorFamily,
};
pub use registry::{GeneratedCandidates, OperatorFailure, OperatorRegistry};
