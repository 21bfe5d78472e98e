// Drum Generator - Runs every stage for every bar of a song
// Anchors, operator candidates, selection, filters, enforcement, then events

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::arranger::combiner::combine_onsets;
use crate::arranger::materialize::{materialize_events, DrumEvent, DEFAULT_NOTE_DURATION};
use crate::arranger::midi::{export_drum_midi, ExportError, MidiExportOptions};
use crate::arranger::onset::{sort_onsets, Onset, OnsetSource};
use crate::arranger::presets::{GroovePreset, GrooveTrack, PresetError};
use crate::arranger::roles::DrumRole;
use crate::arranger::style::StyleConfig;
use crate::groove::grid::{MeterError, TimeSignature};
use crate::groove::position::BeatPosition;
use crate::groove::subdivision::filter_by_subdivision;
use crate::groove::syncopation::filter_by_role_vocabulary;
use crate::groove::timing::{scale_offset_ticks, FixedMeterTimeline, DEFAULT_TICKS_PER_QUARTER};
use crate::operators::{OperatorContext, OperatorFailure, OperatorRegistry};
use crate::protection::{
    augment_bar, enforce_protections, merge_bar_layers, ProtectionMap, TagProfile,
};
use crate::selection::{
    group_candidates, map_candidates, role_rng, AntiRepetitionMemory, BarSelectionState,
    FillShape, HatMode, LimbUsage, MemoryConfig, MemoryError, SelectedCandidate,
    SelectionEngine, SelectionRequest,
};
use crate::song::{build_bar_contexts, BarContext, SectionType, SongStructure, SongStructureError};
use super::diagnostics::Diagnostics;
use super::fingerprint::fingerprint_events;
use super::trace::{TraceError, TraceStage, TraceWriter};

/// Snare/side-stick hits below this velocity count as ghost notes
const GHOST_VELOCITY_CEILING: u8 = 60;

/// Errors that stop a generation run
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid meter: {0}")]
    InvalidMeter(#[from] MeterError),

    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("Song structure has no bars or no sections")]
    MissingSongStructure,

    #[error("Invalid song structure: {0}")]
    InvalidSongStructure(#[source] SongStructureError),

    #[error("Invalid preset {name}: {source}")]
    InvalidPreset {
        name: String,
        #[source]
        source: PresetError,
    },

    #[error(transparent)]
    OperatorFailed(#[from] OperatorFailure),

    #[error(transparent)]
    MemoryOutOfOrder(#[from] MemoryError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

impl From<SongStructureError> for GenerationError {
    fn from(error: SongStructureError) -> Self {
        match error {
            SongStructureError::NoBars | SongStructureError::NoSections => {
                GenerationError::MissingSongStructure
            }
            other => GenerationError::InvalidSongStructure(other),
        }
    }
}

/// Run-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Meter string such as "4/4"
    pub meter: String,

    /// Seed for weighted sampling; `None` selects greedily
    #[serde(default)]
    pub seed: Option<u64>,

    pub ticks_per_quarter: u32,

    pub note_duration_ticks: u32,

    /// Abort on the first operator error instead of skipping the operator
    #[serde(default)]
    pub fail_fast_on_operator_error: bool,

    pub phrase_length_bars: u32,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Append a JSONL trace of the run here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            meter: "4/4".to_string(),
            seed: None,
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            note_duration_ticks: DEFAULT_NOTE_DURATION,
            fail_fast_on_operator_error: false,
            phrase_length_bars: 4,
            memory: MemoryConfig::default(),
            trace_path: None,
        }
    }
}

impl GenerationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_meter(mut self, meter: impl Into<String>) -> Self {
        self.meter = meter.into();
        self
    }

    pub fn with_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = Some(path.into());
        self
    }

    /// Parse the meter and check the numeric settings
    pub fn validate(&self) -> Result<TimeSignature, GenerationError> {
        let time_signature = TimeSignature::parse(&self.meter)?;
        if self.ticks_per_quarter == 0 {
            return Err(GenerationError::InvalidConfig(
                "ticks_per_quarter must be positive".to_string(),
            ));
        }
        if self.phrase_length_bars == 0 {
            return Err(GenerationError::InvalidConfig(
                "phrase_length_bars must be positive".to_string(),
            ));
        }
        if time_signature.ticks_per_beat(self.ticks_per_quarter) == 0 {
            return Err(GenerationError::InvalidConfig(format!(
                "{} ticks per quarter is too coarse for {}",
                self.ticks_per_quarter, self.meter
            )));
        }
        Ok(time_signature)
    }
}

/// Output of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrumTrack {
    pub run_id: Uuid,
    pub time_signature: TimeSignature,
    pub ticks_per_quarter: u32,

    /// Final events, sorted by tick then note
    pub events: Vec<DrumEvent>,

    /// Final onsets, sorted by bar, beat, role
    pub onsets: Vec<Onset>,

    /// Merged and phrase-augmented protections per bar
    pub protections: ProtectionMap,

    pub diagnostics: Diagnostics,

    /// SHA256 of the event table
    pub fingerprint: String,
}

impl DrumTrack {
    pub fn bar_count(&self) -> u32 {
        self.onsets.iter().map(|o| o.bar).max().unwrap_or(0)
    }

    /// Onsets of one bar
    pub fn onsets_in_bar(&self, bar: u32) -> impl Iterator<Item = &Onset> {
        self.onsets.iter().filter(move |o| o.bar == bar)
    }

    /// Standard MIDI file bytes for the track
    pub fn to_midi(&self, bpm: f64) -> Result<Vec<u8>, ExportError> {
        let options = MidiExportOptions {
            ppq: self.ticks_per_quarter,
            bpm,
            time_signature: self.time_signature,
            ..MidiExportOptions::default()
        };
        export_drum_midi(&self.events, &options)
    }
}

/// What one bar contributed
#[derive(Debug, Default)]
struct BarOutput {
    anchors: Vec<Onset>,
    onsets: Vec<Onset>,
    candidates: usize,
    selected: usize,
    filtered_out: usize,
    restored: usize,
    stripped: usize,
    synthesized: usize,
}

/// Drum part generator
#[derive(Debug)]
pub struct DrumGenerator {
    config: GenerationConfig,
    style: StyleConfig,
    tag_profile: TagProfile,
    registry: OperatorRegistry,
    engine: SelectionEngine,
}

impl DrumGenerator {
    /// Generator with the standard operators and the default style
    pub fn new(config: GenerationConfig) -> Self {
        DrumGenerator {
            config,
            style: StyleConfig::default(),
            tag_profile: TagProfile::new(),
            registry: OperatorRegistry::standard(),
            engine: SelectionEngine::new(),
        }
    }

    pub fn with_style(mut self, style: StyleConfig) -> Self {
        self.style = style;
        self
    }

    pub fn with_tag_profile(mut self, tag_profile: TagProfile) -> Self {
        self.tag_profile = tag_profile;
        self
    }

    pub fn with_registry(mut self, registry: OperatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Generate the drum part of a song
    ///
    /// Configuration, song structure and presets are validated before any
    /// bar is processed.
    pub fn generate(
        &self,
        song: &SongStructure,
        grooves: &GrooveTrack,
    ) -> Result<DrumTrack, GenerationError> {
        let time_signature = self.config.validate()?;
        let beats_per_bar = time_signature.beats_per_bar();
        song.validate()?;
        for preset in grooves.presets() {
            preset
                .validate(beats_per_bar)
                .map_err(|source| GenerationError::InvalidPreset {
                    name: preset.name.clone(),
                    source,
                })?;
        }

        let run_id = Uuid::new_v4();
        let trace = self
            .config
            .trace_path
            .as_ref()
            .map(|path| TraceWriter::for_run(path.clone(), run_id));

        let contexts = build_bar_contexts(song, self.config.phrase_length_bars);
        let total = contexts.len().max(1) as f32;
        log::info!(
            "Generating {} bars in {} (run {}, style {}, seed {:?})",
            contexts.len(),
            self.config.meter,
            run_id,
            self.style.style.to_str(),
            self.config.seed
        );

        let protections = self.build_protections(&contexts, grooves, beats_per_bar);
        if let Some(writer) = &trace {
            writer.write(&writer.entry(TraceStage::Setup, 0.0, "Protections merged").with_data(
                serde_json::json!({
                    "bars": contexts.len(),
                    "meter": self.config.meter,
                    "seed": self.config.seed,
                    "operators": self.registry.len(),
                }),
            ))?;
        }

        let mut memory = AntiRepetitionMemory::with_config(self.config.memory);
        let mut diagnostics = Diagnostics::new();
        let mut anchors = Vec::new();
        let mut operator_onsets = Vec::new();

        for (index, context) in contexts.iter().enumerate() {
            let preset = grooves.preset_for_bar(context.bar);
            let diagnostics_before = diagnostics.len();
            let output = self.run_bar(
                context,
                preset,
                beats_per_bar,
                &protections,
                &mut memory,
                &mut diagnostics,
            )?;

            log::debug!(
                "Bar {}: {} candidates, {} selected, {} filtered, {} onsets after enforcement",
                context.bar,
                output.candidates,
                output.selected,
                output.filtered_out,
                output.onsets.len()
            );

            if let Some(writer) = &trace {
                let progress = (index + 1) as f32 / total;
                let mut entries = vec![writer
                    .entry(TraceStage::Bar, progress, format!("Bar {} done", context.bar))
                    .with_bar(context.bar)
                    .with_data(serde_json::json!({
                        "preset": preset.name,
                        "candidates": output.candidates,
                        "selected": output.selected,
                        "filtered_out": output.filtered_out,
                        "restored": output.restored,
                        "stripped": output.stripped,
                        "synthesized": output.synthesized,
                    }))];
                for diagnostic in &diagnostics.entries[diagnostics_before..] {
                    let data = serde_json::to_value(diagnostic).map_err(TraceError::from)?;
                    entries.push(
                        writer
                            .entry(TraceStage::Diagnostic, progress, "Tolerated problem")
                            .with_bar(context.bar)
                            .with_data(data),
                    );
                }
                writer.write_batch(&entries)?;
            }

            anchors.extend(output.anchors);
            operator_onsets.extend(output.onsets);
        }

        let onsets = combine_onsets(&anchors, &operator_onsets);
        let timeline = FixedMeterTimeline::new(time_signature, self.config.ticks_per_quarter);
        let events = materialize_events(&onsets, &timeline, self.config.note_duration_ticks);
        let fingerprint = fingerprint_events(&events);

        if let Some(writer) = &trace {
            writer.write_batch(&[
                writer
                    .entry(TraceStage::Materialize, 1.0, "Events materialized")
                    .with_data(serde_json::json!({
                        "onsets": onsets.len(),
                        "events": events.len(),
                    })),
                writer
                    .entry(TraceStage::Complete, 1.0, "Generation complete")
                    .with_data(serde_json::json!({
                        "fingerprint": fingerprint,
                        "diagnostics": diagnostics.len(),
                    })),
            ])?;
        }

        log::info!(
            "Run {} produced {} events ({} diagnostics), fingerprint {}",
            run_id,
            events.len(),
            diagnostics.len(),
            fingerprint
        );

        Ok(DrumTrack {
            run_id,
            time_signature,
            ticks_per_quarter: self.config.ticks_per_quarter,
            events,
            onsets,
            protections,
            diagnostics,
            fingerprint,
        })
    }

    /// Merge each bar's active layers, then add phrase hooks
    fn build_protections(
        &self,
        contexts: &[BarContext],
        grooves: &GrooveTrack,
        beats_per_bar: u32,
    ) -> ProtectionMap {
        let mut map = ProtectionMap::new();
        for context in contexts {
            let preset = grooves.preset_for_bar(context.bar);
            let tags = self.tag_profile.enabled_tags(context);
            map.set_bar(context.bar, merge_bar_layers(&preset.protection.layers, &tags));
            augment_bar(
                &mut map,
                context,
                preset.protection.phrase_hook.as_ref(),
                beats_per_bar,
            );
        }
        map
    }

    fn run_bar(
        &self,
        context: &BarContext,
        preset: &GroovePreset,
        beats_per_bar: u32,
        protections: &ProtectionMap,
        memory: &mut AntiRepetitionMemory,
        diagnostics: &mut Diagnostics,
    ) -> Result<BarOutput, GenerationError> {
        let bar = context.bar;
        memory.begin_bar(bar)?;

        let anchors = preset.anchors.onsets_for_bar(bar, beats_per_bar);

        let generated = {
            let ctx = OperatorContext::new(context, beats_per_bar, &anchors, self.style.style, memory);
            self.registry.generate(
                &ctx,
                &self.style.allow_list,
                self.config.fail_fast_on_operator_error,
            )?
        };
        for failure in &generated.failures {
            diagnostics.record_operator_failure(failure);
        }

        let mapped = map_candidates(&generated.candidates, beats_per_bar);
        for rejected in mapped.rejected {
            diagnostics.record_rejected(bar, rejected);
        }
        let candidate_count = mapped.candidates.len();
        let groups = group_candidates(mapped.candidates);

        let selected = self.select_bar(context, beats_per_bar, &anchors, &groups, protections, memory);
        let pre_filter = self.operator_onsets(bar, preset, &selected);

        let filtered = filter_by_subdivision(&pre_filter, preset.protection.subdivision.as_ref(), beats_per_bar);
        let filtered = filter_by_role_vocabulary(
            &filtered,
            preset.protection.role_constraints.as_ref(),
            beats_per_bar,
        );

        let mut bar_protections = ProtectionMap::new();
        if let Some(entry) = protections.bar(bar) {
            bar_protections.set_bar(bar, entry.clone());
        }
        let outcome = enforce_protections(
            &pre_filter,
            &filtered,
            &bar_protections,
            preset.orchestration.default_velocity,
        );
        for conflict in &outcome.conflicts {
            diagnostics.record_conflict(conflict.clone());
        }

        self.remember_bar(context, &anchors, &outcome.onsets, &selected, memory);

        Ok(BarOutput {
            candidates: candidate_count,
            selected: selected.len(),
            filtered_out: pre_filter.len() - filtered.len(),
            restored: outcome.restored,
            stripped: outcome.stripped,
            synthesized: outcome.synthesized,
            anchors,
            onsets: outcome.onsets,
        })
    }

    /// Selection for every role with candidates, in role order
    fn select_bar(
        &self,
        context: &BarContext,
        beats_per_bar: u32,
        anchors: &[Onset],
        groups: &[crate::selection::CandidateGroup],
        protections: &ProtectionMap,
        memory: &AntiRepetitionMemory,
    ) -> Vec<SelectedCandidate> {
        let limbs = if self.style.physicality {
            LimbUsage::from_onsets(anchors, self.style.max_hands_per_position)
        } else {
            LimbUsage::unlimited()
        };
        let mut state = BarSelectionState::new(limbs);

        let roles: BTreeSet<DrumRole> = groups
            .iter()
            .flat_map(|group| group.candidates.iter().map(|c| c.role))
            .collect();

        let mut selected = Vec::new();
        for role in roles {
            let anchor_positions: BTreeSet<BeatPosition> = anchors
                .iter()
                .filter(|o| o.role == role)
                .map(|o| o.beat)
                .collect();
            let never_add = protections
                .role(context.bar, role)
                .map(|set| set.never_add.clone())
                .unwrap_or_default();

            let request = SelectionRequest {
                bar: context.bar,
                role,
                beats_per_bar,
                section_index: context.section_index,
                groups,
                anchor_positions: &anchor_positions,
                never_add: &never_add,
                density: self.style.density_for(role),
                cap: self.style.cap_for(role),
            };
            let mut rng = self.config.seed.map(|seed| role_rng(seed, context.bar, role));
            selected.extend(self.engine.select(&request, memory, &mut state, rng.as_mut()));
        }
        selected
    }

    /// Selected candidates as onsets, with orchestration and style biases
    fn operator_onsets(
        &self,
        bar: u32,
        preset: &GroovePreset,
        selected: &[SelectedCandidate],
    ) -> Vec<Onset> {
        let orchestration = &preset.orchestration;
        let mut onsets: Vec<Onset> = selected
            .iter()
            .map(|choice| {
                let candidate = &choice.candidate;
                let mut velocity = orchestration.scale_velocity(
                    candidate.velocity_hint.unwrap_or(orchestration.default_velocity),
                );
                let mut timing = candidate.timing_hint_ticks.unwrap_or(0);
                if self.style.apply_style_bias {
                    let biased = velocity as i16 + self.style.style.velocity_bias(candidate.strength);
                    velocity = biased.clamp(1, 127) as u8;
                    timing += self.style.style.timing_bias_ticks(candidate.strength);
                }
                let timing = scale_offset_ticks(timing, self.config.ticks_per_quarter);
                Onset::from_operator(
                    candidate.role,
                    bar,
                    candidate.beat,
                    velocity,
                    candidate.operator_id.clone(),
                    candidate.candidate_id.clone(),
                )
                .with_timing_offset(timing)
            })
            .collect();
        sort_onsets(&mut onsets);
        onsets
    }

    /// Feed the bar's final result back into memory
    fn remember_bar(
        &self,
        context: &BarContext,
        anchors: &[Onset],
        enforced: &[Onset],
        selected: &[SelectedCandidate],
        memory: &mut AntiRepetitionMemory,
    ) {
        let fill_candidates: HashSet<&str> = selected
            .iter()
            .filter(|choice| choice.candidate.is_fill())
            .map(|choice| choice.candidate.candidate_id.as_str())
            .collect();

        let mut operators_used: BTreeSet<&str> = BTreeSet::new();
        let mut fill_hits: BTreeMap<&str, Vec<(DrumRole, BeatPosition)>> = BTreeMap::new();
        let mut ghosts = 0u32;

        for onset in enforced {
            let OnsetSource::Operator {
                operator_id,
                candidate_id,
            } = &onset.source
            else {
                continue;
            };
            operators_used.insert(operator_id.as_str());
            if fill_candidates.contains(candidate_id.as_str()) {
                fill_hits
                    .entry(operator_id.as_str())
                    .or_default()
                    .push((onset.role, onset.beat));
            }
            if matches!(onset.role, DrumRole::Snare | DrumRole::SideStick)
                && onset.velocity < GHOST_VELOCITY_CEILING
            {
                ghosts += 1;
            }
        }

        for operator_id in operators_used {
            memory.record_operator_use(operator_id);
        }
        for (operator_id, hits) in fill_hits {
            if let Some(shape) = FillShape::from_hits(&hits, Some(operator_id.to_string())) {
                memory.record_fill(context.section_index, shape);
            }
        }
        memory.record_ghost_notes(ghosts);

        let bar_onsets = || anchors.iter().chain(enforced.iter());
        if context.section_type() == Some(SectionType::Chorus) {
            for onset in bar_onsets().filter(|o| o.role == DrumRole::Crash) {
                memory.record_chorus_crash(onset.beat);
            }
        }

        let count = |role: DrumRole| bar_onsets().filter(|o| o.role == role).count();
        let (closed, open, ride) = (
            count(DrumRole::ClosedHat) + count(DrumRole::PedalHat),
            count(DrumRole::OpenHat),
            count(DrumRole::Ride),
        );
        let mode = if ride > 0 && ride >= closed {
            HatMode::Ride
        } else if open > 0 {
            HatMode::Open
        } else if closed > 0 {
            HatMode::Closed
        } else {
            HatMode::Silent
        };
        memory.record_hat_mode(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::presets::PresetId;
    use crate::arranger::style::{OperatorAllowList, StyleId};
    use crate::groove::grid::SubdivisionPolicy;
    use crate::groove::timing::BarTimeline;
    use crate::operators::registry::test_operators::{BrokenOperator, FixedGhost};
    use crate::pipeline::trace::read_trace_file;
    use crate::protection::{ProtectionKind, ProtectionLayer, RoleProtectionSet};
    use crate::song::Section;

    fn verse(bars: u32) -> SongStructure {
        SongStructure::sequential(&[(SectionType::Verse, bars)])
    }

    fn song() -> SongStructure {
        SongStructure::sequential(&[
            (SectionType::Intro, 4),
            (SectionType::Verse, 8),
            (SectionType::Chorus, 8),
            (SectionType::Verse, 8),
            (SectionType::Chorus, 8),
            (SectionType::Outro, 4),
        ])
    }

    fn pop_rock() -> GrooveTrack {
        GrooveTrack::uniform(PresetId::PopRockBasic.build(4))
    }

    fn ghost_generator() -> DrumGenerator {
        let mut registry = OperatorRegistry::new();
        registry.register(Box::new(FixedGhost));
        DrumGenerator::new(GenerationConfig::default()).with_registry(registry)
    }

    #[test]
    fn test_golden_pop_rock_anchors_only() {
        let generator = DrumGenerator::new(GenerationConfig::default())
            .with_style(StyleConfig::anchors_only(StyleId::PopRock));
        let track = generator.generate(&verse(8), &pop_rock()).unwrap();

        let mut expected = Vec::new();
        for bar in 0..8u64 {
            let start = bar * 1920;
            for eighth in 0..8u64 {
                let tick = start + eighth * 240;
                if eighth % 4 == 0 {
                    expected.push(DrumEvent { tick, note: 36, velocity: 100, duration: 120 });
                }
                if eighth % 4 == 2 {
                    expected.push(DrumEvent { tick, note: 38, velocity: 100, duration: 120 });
                }
                expected.push(DrumEvent { tick, note: 42, velocity: 80, duration: 120 });
            }
        }

        assert_eq!(track.events.len(), 96);
        assert_eq!(track.events.iter().filter(|e| e.note == 36).count(), 16);
        assert_eq!(track.events.iter().filter(|e| e.note == 38).count(), 16);
        assert_eq!(track.events.iter().filter(|e| e.note == 42).count(), 64);
        assert_eq!(track.events, expected);
        assert!(track.diagnostics.is_empty());
        assert_eq!(track.fingerprint, fingerprint_events(&expected));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let config = GenerationConfig::default().with_seed(42);
        let first = DrumGenerator::new(config.clone()).generate(&song(), &pop_rock()).unwrap();
        let second = DrumGenerator::new(config).generate(&song(), &pop_rock()).unwrap();

        assert_eq!(first.events, second.events);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_ne!(first.run_id, second.run_id);
        assert!(first.events.len() > 40 * 12);
    }

    #[test]
    fn test_unseeded_runs_are_identical() {
        let generator = DrumGenerator::new(GenerationConfig::default());
        let first = generator.generate(&song(), &pop_rock()).unwrap();
        let second = generator.generate(&song(), &pop_rock()).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_must_hit_always_present() {
        for seed in [1u64, 7, 99] {
            let track = DrumGenerator::new(GenerationConfig::default().with_seed(seed))
                .generate(&song(), &pop_rock())
                .unwrap();

            for (bar, roles) in &track.protections.bars {
                for (role, set) in roles {
                    for beat in &set.must_hit {
                        assert!(
                            track.onsets.iter().any(|o| o.is_at(*bar, *beat, *role)),
                            "bar {} {} {} missing",
                            bar,
                            role,
                            beat
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_must_hit_lands_on_its_tick() {
        let mut preset = PresetId::PopRockBasic.build(4);
        preset.protection.layers.push(ProtectionLayer::new("ghost_pickup").with_role(
            DrumRole::Snare,
            RoleProtectionSet::new().with(ProtectionKind::MustHit, &[1.75]),
        ));
        let track = ghost_generator()
            .with_style(StyleConfig::for_style(StyleId::HipHop))
            .generate(&verse(2), &GrooveTrack::uniform(preset))
            .unwrap();

        let timeline = FixedMeterTimeline::default();
        for bar in 1..=2 {
            let tick = timeline.to_tick(bar, BeatPosition::new(1.75));
            let snares: Vec<u64> = track
                .events
                .iter()
                .filter(|e| e.note == 38)
                .filter(|e| e.tick >= timeline.bar_start_tick(bar) && e.tick < tick + 100)
                .map(|e| e.tick)
                .collect();
            assert_eq!(snares, vec![tick], "bar {}", bar);
        }
    }

    #[test]
    fn test_micro_timing_follows_resolution() {
        let ghost_tick = |ticks_per_quarter: u32| {
            let config = GenerationConfig {
                ticks_per_quarter,
                ..GenerationConfig::default()
            };
            let mut registry = OperatorRegistry::new();
            registry.register(Box::new(FixedGhost));
            let track = DrumGenerator::new(config)
                .with_registry(registry)
                .with_style(StyleConfig::for_style(StyleId::HipHop))
                .generate(&verse(2), &pop_rock())
                .unwrap();
            track
                .events
                .iter()
                .find(|e| e.note == 38 && e.tick < ticks_per_quarter as u64)
                .map(|e| e.tick)
        };

        // Pickup at 1.75 laid back by 12 ticks at 480 PPQ
        assert_eq!(ghost_tick(480), Some(372));
        assert_eq!(ghost_tick(960), Some(744));
    }

    #[test]
    fn test_never_add_does_not_silence_anchors() {
        let mut preset = PresetId::PopRockBasic.build(4);
        preset.protection.layers.push(ProtectionLayer::new("no_backbeat_adds").with_role(
            DrumRole::Snare,
            RoleProtectionSet::new().with(ProtectionKind::NeverAdd, &[2.0]),
        ));
        let track = DrumGenerator::new(GenerationConfig::default())
            .with_style(StyleConfig::anchors_only(StyleId::PopRock))
            .generate(&verse(2), &GrooveTrack::uniform(preset))
            .unwrap();

        // NeverAdd keeps operators off a position; the groove's own hit stays
        for bar in 1..=2 {
            let hit = track
                .onsets
                .iter()
                .find(|o| o.is_at(bar, BeatPosition::new(2.0), DrumRole::Snare))
                .unwrap();
            assert!(hit.is_anchor());
        }
        assert_eq!(track.events.len(), 2 * 12);
        assert!(track.diagnostics.conflicts().next().is_none());
    }

    #[test]
    fn test_never_add_blocks_operator_hits() {
        let open = ghost_generator().generate(&verse(4), &pop_rock()).unwrap();
        assert!(open
            .onsets
            .iter()
            .any(|o| o.role == DrumRole::Snare && o.beat == BeatPosition::new(1.75)));

        let mut preset = PresetId::PopRockBasic.build(4);
        preset.protection.layers.push(ProtectionLayer::new("no_ghost").with_role(
            DrumRole::Snare,
            RoleProtectionSet::new().with(ProtectionKind::NeverAdd, &[1.75]),
        ));
        let blocked = ghost_generator()
            .generate(&verse(4), &GrooveTrack::uniform(preset))
            .unwrap();

        for onset in blocked.onsets.iter().filter(|o| o.operator_id().is_some()) {
            assert!(!blocked.protections.contains(
                onset.bar,
                onset.role,
                ProtectionKind::NeverAdd,
                onset.beat
            ));
        }
        assert_eq!(blocked.events.len(), 48);
    }

    #[test]
    fn test_must_hit_wins_over_never_add() {
        let mut preset = PresetId::PopRockBasic.build(4);
        preset.protection.layers.push(ProtectionLayer::new("contested").with_role(
            DrumRole::Snare,
            RoleProtectionSet::new()
                .with(ProtectionKind::MustHit, &[3.0])
                .with(ProtectionKind::NeverAdd, &[3.0]),
        ));
        let track = DrumGenerator::new(GenerationConfig::default())
            .with_style(StyleConfig::anchors_only(StyleId::PopRock))
            .generate(&verse(2), &GrooveTrack::uniform(preset))
            .unwrap();

        for bar in 1..=2 {
            let hit = track
                .onsets
                .iter()
                .find(|o| o.is_at(bar, BeatPosition::new(3.0), DrumRole::Snare))
                .unwrap();
            assert_eq!(hit.source, OnsetSource::Protection);
        }
        assert_eq!(track.diagnostics.conflicts().count(), 2);
    }

    #[test]
    fn test_operator_onsets_stay_on_grid() {
        let preset = PresetId::TripletShuffle.build(4);
        let policy = preset.protection.subdivision.unwrap_or(SubdivisionPolicy::NONE);
        let track = DrumGenerator::new(GenerationConfig::default().with_seed(5))
            .generate(&song(), &GrooveTrack::uniform(preset))
            .unwrap();

        for onset in &track.onsets {
            if onset.operator_id().is_some() && !onset.never_remove {
                assert!(policy.allows(onset.beat), "{} {} off grid", onset.role, onset.beat);
            }
        }
    }

    #[test]
    fn test_operator_error_is_isolated() {
        let mut registry = OperatorRegistry::new();
        registry.register(Box::new(BrokenOperator));
        registry.register(Box::new(FixedGhost));
        let track = DrumGenerator::new(GenerationConfig::default())
            .with_registry(registry)
            .generate(&verse(4), &pop_rock())
            .unwrap();

        assert_eq!(track.diagnostics.operator_failures().count(), 4);
        assert_eq!(
            track.onsets.iter().filter(|o| o.operator_id() == Some("fixed_ghost")).count(),
            4
        );
    }

    #[test]
    fn test_fail_fast_aborts() {
        let mut registry = OperatorRegistry::new();
        registry.register(Box::new(BrokenOperator));
        let config = GenerationConfig {
            fail_fast_on_operator_error: true,
            ..GenerationConfig::default()
        };
        let result = DrumGenerator::new(config)
            .with_registry(registry)
            .generate(&verse(4), &pop_rock());

        match result {
            Err(GenerationError::OperatorFailed(failure)) => {
                assert_eq!(failure.operator_id, "broken");
                assert_eq!(failure.bar, 1);
            }
            other => panic!("expected operator failure, got {:?}", other.map(|t| t.events.len())),
        }
    }

    #[test]
    fn test_allow_list_filters_operators() {
        let generator = ghost_generator().with_style(
            StyleConfig::for_style(StyleId::PopRock)
                .with_allow_list(OperatorAllowList::Except(["fixed_ghost".to_string()].into_iter().collect())),
        );
        let track = generator.generate(&verse(4), &pop_rock()).unwrap();
        assert!(track.onsets.iter().all(|o| o.operator_id().is_none()));
    }

    #[test]
    fn test_configuration_errors() {
        let generator = DrumGenerator::new(GenerationConfig::default().with_meter("4/0"));
        assert!(matches!(
            generator.generate(&verse(4), &pop_rock()),
            Err(GenerationError::InvalidMeter(_))
        ));

        let generator = DrumGenerator::new(GenerationConfig::default());
        assert!(matches!(
            generator.generate(&SongStructure::new(8), &pop_rock()),
            Err(GenerationError::MissingSongStructure)
        ));

        let overlapping = SongStructure::new(8)
            .with_section(Section::new(1, 4, SectionType::Verse))
            .with_section(Section::new(3, 4, SectionType::Chorus));
        assert!(matches!(
            generator.generate(&overlapping, &pop_rock()),
            Err(GenerationError::InvalidSongStructure(_))
        ));

        let mut preset = PresetId::PopRockBasic.build(4);
        preset.anchors.patterns[0].beats.push(BeatPosition::new(6.0));
        assert!(matches!(
            generator.generate(&verse(4), &GrooveTrack::uniform(preset)),
            Err(GenerationError::InvalidPreset { .. })
        ));
    }

    #[test]
    fn test_phrase_hook_protects_last_bar_downbeats() {
        let track = DrumGenerator::new(GenerationConfig::default())
            .generate(&verse(4), &pop_rock())
            .unwrap();

        for bar in 1..=4 {
            for role in [DrumRole::ClosedHat, DrumRole::Crash, DrumRole::TomLow] {
                let protected = track.protections.contains(
                    bar,
                    role,
                    ProtectionKind::NeverRemove,
                    BeatPosition::DOWNBEAT,
                );
                assert_eq!(protected, bar == 4, "bar {} {}", bar, role);
            }
        }
    }

    #[test]
    fn test_three_four_meter() {
        let track = DrumGenerator::new(GenerationConfig::default().with_meter("3/4"))
            .with_style(StyleConfig::anchors_only(StyleId::PopRock))
            .generate(&verse(2), &GrooveTrack::uniform(PresetId::PopRockBasic.build(3)))
            .unwrap();

        let kicks: Vec<u64> = track
            .events
            .iter()
            .filter(|e| e.note == 36)
            .map(|e| e.tick)
            .collect();
        assert_eq!(kicks, vec![0, 960, 1440, 2400]);
        assert_eq!(track.events.iter().filter(|e| e.note == 38).count(), 2);
    }

    #[test]
    fn test_preset_change_mid_song() {
        let grooves = pop_rock().with_change(3, PresetId::HalfTime.build(4));
        let track = DrumGenerator::new(GenerationConfig::default())
            .with_style(StyleConfig::anchors_only(StyleId::PopRock))
            .generate(&verse(4), &grooves)
            .unwrap();

        let snares = |bar: u32| -> Vec<f64> {
            track
                .onsets_in_bar(bar)
                .filter(|o| o.role == DrumRole::Snare)
                .map(|o| o.beat.value())
                .collect()
        };
        assert_eq!(snares(2), vec![2.0, 4.0]);
        assert_eq!(snares(3), vec![3.0]);
    }

    #[test]
    fn test_trace_file_records_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let track = DrumGenerator::new(GenerationConfig::default().with_seed(3).with_trace(&path))
            .generate(&verse(4), &pop_rock())
            .unwrap();

        let entries = read_trace_file(&path).unwrap();
        assert!(entries.iter().all(|e| e.run_id == track.run_id));
        assert_eq!(entries.first().map(|e| e.stage), Some(TraceStage::Setup));
        assert_eq!(entries.last().map(|e| e.stage), Some(TraceStage::Complete));
        assert_eq!(entries.iter().filter(|e| e.stage == TraceStage::Bar).count(), 4);
        assert_eq!(
            entries.last().and_then(|e| e.data.as_ref()).map(|d| d["fingerprint"].clone()),
            Some(serde_json::Value::String(track.fingerprint.clone()))
        );
    }

    #[test]
    fn test_track_exports_midi() {
        let track = DrumGenerator::new(GenerationConfig::default())
            .with_style(StyleConfig::anchors_only(StyleId::PopRock))
            .generate(&verse(2), &pop_rock())
            .unwrap();
        let bytes = track.to_midi(96.0).unwrap();
        assert!(midly::Smf::parse(&bytes).is_ok());
        assert_eq!(track.bar_count(), 1);
    }
}
