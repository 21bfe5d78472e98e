// Groove Engine - Beat positions, grids, filters and tick timing
// Musical-grid side of drum generation

pub mod position;
pub mod grid;
pub mod subdivision;
pub mod syncopation;
pub mod timing;

pub use position::{BeatPosition, BEAT_RESOLUTION, GRID_EPSILON};
pub use grid::{backbeats, MeterError, SubdivisionGrid, SubdivisionPolicy, TimeSignature};
pub use subdivision::filter_by_subdivision;
pub use syncopation::{
    classify_offbeat, filter_by_role_vocabulary, OffbeatKind, RoleConstraintPolicy,
    RoleRhythmVocabulary,
};
pub use timing::{BarTimeline, FixedMeterTimeline, DEFAULT_TICKS_PER_QUARTER};
