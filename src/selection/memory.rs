// Anti-Repetition Memory - What the drummer played in recent bars
// Mutated bar by bar in increasing order; read by operators and the selection engine

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;

/// Default trailing window in bars
pub const DEFAULT_MEMORY_WINDOW: u32 = 8;

/// Density tolerance when comparing fill shapes
pub const FILL_DENSITY_TOLERANCE: f64 = 0.1;

/// Penalty applied to a fill that repeats the previous section's fill
pub const FILL_REPEAT_PENALTY: f64 = 0.8;

/// Errors raised by the memory
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Bar {bar} arrived after bar {last}; bars must be processed in increasing order")]
    OutOfOrder { bar: u32, last: u32 },
}

/// How an operator's past use fades over the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum DecayCurve {
    /// Weight `factor^(age - 1)`
    Exponential { factor: f64 },

    /// Weight falls linearly to zero at the window edge
    Linear,
}

impl Default for DecayCurve {
    fn default() -> Self {
        DecayCurve::Exponential { factor: 0.5 }
    }
}

impl DecayCurve {
    /// Weight of a use `age` bars ago (age >= 1)
    pub fn weight(&self, age: u32, window: u32) -> f64 {
        if age == 0 || age > window {
            return 0.0;
        }
        match self {
            DecayCurve::Exponential { factor } => factor.clamp(0.0, 1.0).powi(age as i32 - 1),
            DecayCurve::Linear => 1.0 - (age - 1) as f64 / window as f64,
        }
    }
}

/// Memory tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Trailing window in bars
    pub window_bars: u32,

    /// Decay of past operator use
    pub decay: DecayCurve,

    /// Multiplier on the summed decay weights before clamping
    pub penalty_scale: f64,

    /// Fill density tolerance
    pub fill_density_tolerance: f64,

    /// Penalty for a repeated fill
    pub fill_repeat_penalty: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            window_bars: DEFAULT_MEMORY_WINDOW,
            decay: DecayCurve::default(),
            penalty_scale: 0.5,
            fill_density_tolerance: FILL_DENSITY_TOLERANCE,
            fill_repeat_penalty: FILL_REPEAT_PENALTY,
        }
    }
}

/// Rough outline of a fill, used to spot repeats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillShape {
    /// Roles the fill plays
    pub roles: BTreeSet<DrumRole>,

    /// Hits per beat
    pub density: f64,

    /// Length in beats from first to last hit
    pub duration_beats: f64,

    /// Optional label (operator id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FillShape {
    /// Shape of a set of (role, beat) hits
    pub fn from_hits(hits: &[(DrumRole, BeatPosition)], tag: Option<String>) -> Option<Self> {
        let first = hits.iter().map(|(_, b)| b.value()).reduce(f64::min)?;
        let last = hits.iter().map(|(_, b)| b.value()).reduce(f64::max)?;
        let duration_beats = last - first;

        Some(FillShape {
            roles: hits.iter().map(|(role, _)| *role).collect(),
            density: hits.len() as f64 / duration_beats.max(1.0),
            duration_beats,
            tag,
        })
    }

    /// Same roles and a density within `tolerance`
    pub fn matches(&self, other: &FillShape, tolerance: f64) -> bool {
        self.roles == other.roles && (self.density - other.density).abs() <= tolerance
    }
}

/// Hi-hat playing mode of a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HatMode {
    Closed,
    Open,
    Ride,
    Silent,
}

/// Chorus crash placements; the first two recorded crashes set the pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChorusCrashPattern {
    recorded: Vec<BeatPosition>,
    established: bool,
}

impl ChorusCrashPattern {
    /// Record a chorus crash
    pub fn record(&mut self, beat: BeatPosition) {
        if self.established {
            return;
        }
        if !self.recorded.contains(&beat) {
            self.recorded.push(beat);
        }
        self.established = self.recorded.len() >= 2;
    }

    /// Everything is accepted until the pattern is established
    pub fn accepts(&self, beat: BeatPosition) -> bool {
        !self.established || self.recorded.contains(&beat)
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Beats recorded so far
    pub fn beats(&self) -> &[BeatPosition] {
        &self.recorded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FillRecord {
    bar: u32,
    section_index: Option<usize>,
    shape: FillShape,
}

/// Rolling record of recent choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiRepetitionMemory {
    config: MemoryConfig,
    current_bar: Option<u32>,
    operator_uses: BTreeMap<String, BTreeSet<u32>>,
    fills: Vec<FillRecord>,
    chorus_crash: ChorusCrashPattern,
    hat_modes: VecDeque<(u32, HatMode)>,
    ghost_counts: VecDeque<(u32, u32)>,
}

impl AntiRepetitionMemory {
    /// Memory with default tuning
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Memory with custom tuning
    pub fn with_config(config: MemoryConfig) -> Self {
        AntiRepetitionMemory {
            config: MemoryConfig {
                window_bars: config.window_bars.max(1),
                ..config
            },
            current_bar: None,
            operator_uses: BTreeMap::new(),
            fills: Vec::new(),
            chorus_crash: ChorusCrashPattern::default(),
            hat_modes: VecDeque::new(),
            ghost_counts: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Bar currently being generated
    pub fn current_bar(&self) -> Option<u32> {
        self.current_bar
    }

    /// Move to the next bar; bars must strictly increase
    pub fn begin_bar(&mut self, bar: u32) -> Result<(), MemoryError> {
        if let Some(last) = self.current_bar {
            if bar <= last {
                return Err(MemoryError::OutOfOrder { bar, last });
            }
        }
        self.current_bar = Some(bar);
        self.prune(bar);
        Ok(())
    }

    fn prune(&mut self, bar: u32) {
        let window = self.config.window_bars;
        let horizon = bar.saturating_sub(window);

        for bars in self.operator_uses.values_mut() {
            bars.retain(|used| *used >= horizon);
        }
        self.operator_uses.retain(|_, bars| !bars.is_empty());

        while self.hat_modes.front().is_some_and(|(b, _)| *b < horizon) {
            self.hat_modes.pop_front();
        }
        while self.ghost_counts.front().is_some_and(|(b, _)| *b < horizon) {
            self.ghost_counts.pop_front();
        }
    }

    fn bar_or_zero(&self) -> u32 {
        self.current_bar.unwrap_or(0)
    }

    /// Note that an operator contributed to the current bar
    pub fn record_operator_use(&mut self, operator_id: &str) {
        let bar = self.bar_or_zero();
        self.operator_uses
            .entry(operator_id.to_string())
            .or_default()
            .insert(bar);
    }

    /// Decayed penalty in [0, 1] for reusing an operator in the current bar
    pub fn operator_penalty(&self, operator_id: &str) -> f64 {
        let Some(bars) = self.operator_uses.get(operator_id) else {
            return 0.0;
        };
        let current = self.bar_or_zero();
        let total: f64 = bars
            .iter()
            .filter(|used| **used < current)
            .map(|used| self.config.decay.weight(current - used, self.config.window_bars))
            .sum();
        (total * self.config.penalty_scale).clamp(0.0, 1.0)
    }

    /// Remember a fill played in the current bar
    pub fn record_fill(&mut self, section_index: Option<usize>, shape: FillShape) {
        let bar = self.bar_or_zero();
        self.fills.push(FillRecord {
            bar,
            section_index,
            shape,
        });
    }

    /// Most recent fill recorded in the section right before `section_index`
    ///
    /// A section that played no fill breaks the chain; fills from earlier
    /// sections are never compared.
    pub fn previous_section_fill(&self, section_index: Option<usize>) -> Option<&FillShape> {
        let previous = section_index?.checked_sub(1)?;
        self.fills
            .iter()
            .rev()
            .find(|record| record.section_index == Some(previous))
            .map(|record| &record.shape)
    }

    /// 0.8 when `shape` repeats the previous section's fill, else 0.0
    pub fn fill_repetition_penalty(&self, section_index: Option<usize>, shape: &FillShape) -> f64 {
        match self.previous_section_fill(section_index) {
            Some(previous) if previous.matches(shape, self.config.fill_density_tolerance) => {
                self.config.fill_repeat_penalty
            }
            _ => 0.0,
        }
    }

    /// Record a crash played in a chorus
    pub fn record_chorus_crash(&mut self, beat: BeatPosition) {
        self.chorus_crash.record(beat);
    }

    /// Whether a chorus crash at `beat` fits the established pattern
    pub fn chorus_crash_accepts(&self, beat: BeatPosition) -> bool {
        self.chorus_crash.accepts(beat)
    }

    pub fn chorus_crash_pattern(&self) -> &ChorusCrashPattern {
        &self.chorus_crash
    }

    /// Record the hat mode of the current bar
    pub fn record_hat_mode(&mut self, mode: HatMode) {
        let bar = self.bar_or_zero();
        self.hat_modes.push_back((bar, mode));
    }

    pub fn last_hat_mode(&self) -> Option<HatMode> {
        self.hat_modes.back().map(|(_, mode)| *mode)
    }

    /// Number of consecutive recorded bars ending now in the same mode
    pub fn hat_mode_streak(&self) -> usize {
        let Some(last) = self.last_hat_mode() else {
            return 0;
        };
        self.hat_modes
            .iter()
            .rev()
            .take_while(|(_, mode)| *mode == last)
            .count()
    }

    /// Record how many ghost notes the current bar played
    pub fn record_ghost_notes(&mut self, count: u32) {
        let bar = self.bar_or_zero();
        self.ghost_counts.push_back((bar, count));
    }

    /// Mean ghost notes per bar over the trailing window
    pub fn ghost_note_frequency(&self) -> f64 {
        if self.ghost_counts.is_empty() {
            return 0.0;
        }
        let total: u32 = self.ghost_counts.iter().map(|(_, count)| count).sum();
        total as f64 / self.ghost_counts.len() as f64
    }

    /// Forget everything, including the bar order
    pub fn reset(&mut self) {
        *self = Self::with_config(self.config);
    }
}

impl Default for AntiRepetitionMemory {
    fn default() -> Self {
        Self::new()
    }
}
