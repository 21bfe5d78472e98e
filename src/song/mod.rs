// Song Structure - Sections and per-bar context
// Answers "which section is this bar in, and how close is its end?"

pub mod section;
pub mod bar_context;

pub use section::{Section, SectionType, SongStructure, SongStructureError};
pub use bar_context::{build_bar_contexts, context_for_bar, BarContext, DEFAULT_PHRASE_LENGTH};
