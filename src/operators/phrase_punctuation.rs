// Phrase Punctuation - Crashes, setups and fills at section and phrase boundaries
// Fill candidates carry a FillRole so repeated fill shapes can be penalized

use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;
use crate::song::SectionType;
use super::types::{
    DrumCandidate, DrumOperator, FillRole, OperatorContext, OperatorError, OperatorFamily,
};

/// Fill role of hit `index` out of `count`
fn fill_role_at(index: usize, count: usize) -> FillRole {
    if index == 0 {
        FillRole::FillStart
    } else if index + 1 == count {
        FillRole::FillEnd
    } else {
        FillRole::FillBody
    }
}

/// Turn a list of (role, beat, velocity) hits into fill candidates
fn fill_candidates<O: DrumOperator + ?Sized>(
    operator: &O,
    ctx: &OperatorContext<'_>,
    hits: &[(DrumRole, BeatPosition, u8)],
    score: f64,
) -> Vec<DrumCandidate> {
    hits.iter()
        .enumerate()
        .map(|(i, (role, beat, velocity))| {
            operator
                .candidate(ctx, *role, *beat, score)
                .with_velocity(*velocity)
                .with_fill_role(fill_role_at(i, hits.len()))
        })
        .collect()
}

/// Sixteenths across the last beat of the bar
fn last_beat_sixteenths(ctx: &OperatorContext<'_>) -> [BeatPosition; 4] {
    let last = ctx.last_beat();
    [0.0, 0.25, 0.5, 0.75].map(|offset| last.shifted(offset))
}

/// Crash on beat one of a new section
pub struct CrashOnOne;

impl DrumOperator for CrashOnOne {
    fn id(&self) -> &'static str {
        "crash_on_one"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        if !ctx.bar.is_section_start() || ctx.bar.bar == 1 {
            return Ok(false);
        }
        if ctx.section_type() == Some(SectionType::Chorus) {
            return Ok(ctx.memory.chorus_crash_accepts(BeatPosition::DOWNBEAT));
        }
        Ok(true)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(vec![self
            .candidate(ctx, DrumRole::Crash, BeatPosition::DOWNBEAT, 0.9)
            .with_velocity(110)])
    }
}

/// Kick and snare together on the last offbeat before a new section
pub struct SetupHit;

impl DrumOperator for SetupHit {
    fn id(&self) -> &'static str {
        "setup_hit"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.is_section_end() && ctx.bar.next_section_type.is_some())
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let beat = ctx.last_beat().shifted(0.5);
        Ok([DrumRole::Kick, DrumRole::Snare]
            .into_iter()
            .map(|role| {
                self.candidate(ctx, role, beat, 0.6)
                    .with_velocity(105)
                    .with_fill_role(FillRole::Setup)
            })
            .collect())
    }
}

/// Snare eighths over the last two beats, rising into a bigger section
pub struct BuildFill;

impl DrumOperator for BuildFill {
    fn id(&self) -> &'static str {
        "build_fill"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        let rising = ctx
            .bar
            .next_section_type
            .map(|next| next.energy() > ctx.energy())
            .unwrap_or(false);
        Ok(ctx.bar.is_section_end() && rising)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        if ctx.beats_per_bar < 2 {
            return Err(OperatorError::UnsupportedMeter {
                operator_id: self.id().to_string(),
                beats_per_bar: ctx.beats_per_bar,
            });
        }

        let start = ctx.last_beat().shifted(-1.0);
        let hits: Vec<(DrumRole, BeatPosition, u8)> = (0..4)
            .map(|i| {
                let velocity = 60 + (i as u8) * 13;
                (DrumRole::Snare, start.shifted(i as f64 * 0.5), velocity)
            })
            .collect();
        Ok(fill_candidates(self, ctx, &hits, 0.7))
    }
}

/// Descending tom run across the last beat
pub struct TomRunFill;

impl DrumOperator for TomRunFill {
    fn id(&self) -> &'static str {
        "tom_run_fill"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.is_section_end())
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let [a, b, c, d] = last_beat_sixteenths(ctx);
        let hits: [(DrumRole, BeatPosition, u8); 4] = [
            (DrumRole::TomHigh, a, 95),
            (DrumRole::TomHigh, b, 90),
            (DrumRole::TomMid, c, 92),
            (DrumRole::FloorTom, d, 100),
        ];
        Ok(fill_candidates(self, ctx, &hits, 0.65))
    }
}

/// Snare sixteenths across the last beat, crescendo
pub struct SnareRollFill;

impl DrumOperator for SnareRollFill {
    fn id(&self) -> &'static str {
        "snare_roll_fill"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.is_section_end() && ctx.has_role(DrumRole::Snare))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let hits: Vec<(DrumRole, BeatPosition, u8)> = last_beat_sixteenths(ctx)
            .into_iter()
            .zip([70, 80, 92, 105])
            .map(|(beat, velocity)| (DrumRole::Snare, beat, velocity))
            .collect();
        Ok(fill_candidates(self, ctx, &hits, 0.6))
    }
}

/// Short snare-to-tom figure at the end of a phrase inside a section
pub struct TurnaroundFill;

impl DrumOperator for TurnaroundFill {
    fn id(&self) -> &'static str {
        "turnaround_fill"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PhrasePunctuation
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.is_phrase_end() && !ctx.bar.is_section_end())
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let last = ctx.last_beat();
        let hits: [(DrumRole, BeatPosition, u8); 2] = [
            (DrumRole::Snare, last.shifted(0.5), 85),
            (DrumRole::TomLow, last.shifted(0.75), 90),
        ];
        Ok(fill_candidates(self, ctx, &hits, 0.5))
    }
}
