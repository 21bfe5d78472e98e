// Style Idioms - Figures that only make sense in one style
// Each one checks the style id before proposing anything

use crate::arranger::roles::DrumRole;
use crate::arranger::style::StyleId;
use crate::groove::grid::{backbeats, SubdivisionGrid};
use crate::groove::position::BeatPosition;
use crate::song::SectionType;
use super::types::{DrumCandidate, DrumOperator, OperatorContext, OperatorError, OperatorFamily};

/// Pop/rock four-on-the-floor kick in choruses
pub struct PopRockFourOnFloor;

impl DrumOperator for PopRockFourOnFloor {
    fn id(&self) -> &'static str {
        "pop_rock_four_on_floor"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::PopRock && ctx.section_type() == Some(SectionType::Chorus))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(ctx
            .whole_beats()
            .into_iter()
            .filter(|beat| !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.5).with_velocity(100))
            .collect())
    }
}

/// Funk: ghost snares on the "e" and "a" of every beat
pub struct FunkGhostGrid;

impl DrumOperator for FunkGhostGrid {
    fn id(&self) -> &'static str {
        "funk_ghost_grid"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::Funk)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let mut candidates = Vec::new();
        for beat in ctx.whole_beats() {
            for offset in [0.25, 0.75] {
                candidates.push(
                    self.candidate(ctx, DrumRole::Snare, beat.shifted(offset), 0.35)
                        .with_velocity(30)
                        .with_max_adds(3),
                );
            }
        }
        Ok(candidates)
    }
}

/// Funk: kicks anticipating the odd beats
pub struct FunkKickSyncopation;

impl DrumOperator for FunkKickSyncopation {
    fn id(&self) -> &'static str {
        "funk_kick_syncopation"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::Funk && ctx.has_role(DrumRole::Kick))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(ctx
            .whole_beats()
            .into_iter()
            .filter(|beat| beat.beat_number() % 2 == 1)
            .map(|beat| beat.shifted(0.75))
            .filter(|beat| ctx.in_bar(*beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.45).with_velocity(90))
            .collect())
    }
}

/// Jazz: ride "spang-a-lang" with hi-hat foot on the backbeats
pub struct JazzRideSpang;

impl DrumOperator for JazzRideSpang {
    fn id(&self) -> &'static str {
        "jazz_ride_spang"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::Jazz)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let mut candidates: Vec<DrumCandidate> = ctx
            .whole_beats()
            .into_iter()
            .map(|beat| self.candidate(ctx, DrumRole::Ride, beat, 0.6).with_velocity(80))
            .collect();

        for backbeat in backbeats(ctx.beats_per_bar) {
            let skip = BeatPosition::new(backbeat.value() + 2.0 / 3.0);
            if ctx.in_bar(skip) {
                candidates.push(self.candidate(ctx, DrumRole::Ride, skip, 0.5).with_velocity(65));
            }
            candidates.push(
                self.candidate(ctx, DrumRole::PedalHat, backbeat, 0.55)
                    .with_velocity(70),
            );
        }
        Ok(candidates)
    }
}

/// Metal: double-kick sixteenths in energetic sections
pub struct MetalDoubleKick;

impl DrumOperator for MetalDoubleKick {
    fn id(&self) -> &'static str {
        "metal_double_kick"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::Metal && ctx.energy() >= 0.6)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(SubdivisionGrid::Sixteenth
            .positions_in_bar(ctx.beats_per_bar)
            .into_iter()
            .filter(|beat| !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.5).with_velocity(95))
            .collect())
    }
}

/// Hip-hop: laid-back boom-bap kicks
pub struct HipHopBoomBap;

impl DrumOperator for HipHopBoomBap {
    fn id(&self) -> &'static str {
        "hip_hop_boom_bap"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::StyleIdiom
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.style == StyleId::HipHop && ctx.beats_per_bar >= 4)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok([1.75, 3.5]
            .into_iter()
            .map(BeatPosition::new)
            .filter(|beat| !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| {
                self.candidate(ctx, DrumRole::Kick, beat, 0.55)
                    .with_velocity(92)
                    .with_timing(10)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::types::test_support::{contexts, rock_anchors};
    use crate::selection::memory::AntiRepetitionMemory;

    #[test]
    fn test_idioms_gated_by_style() {
        let bars = contexts(&[(SectionType::Chorus, 2)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();

        for style in StyleId::ALL {
            let ctx = OperatorContext::new(&bars[0], 4, &anchors, style, &memory);
            assert_eq!(PopRockFourOnFloor.can_apply(&ctx).unwrap(), style == StyleId::PopRock);
            assert_eq!(FunkGhostGrid.can_apply(&ctx).unwrap(), style == StyleId::Funk);
            assert_eq!(FunkKickSyncopation.can_apply(&ctx).unwrap(), style == StyleId::Funk);
            assert_eq!(JazzRideSpang.can_apply(&ctx).unwrap(), style == StyleId::Jazz);
            assert_eq!(MetalDoubleKick.can_apply(&ctx).unwrap(), style == StyleId::Metal);
            assert_eq!(HipHopBoomBap.can_apply(&ctx).unwrap(), style == StyleId::HipHop);
        }
    }

    #[test]
    fn test_four_on_floor_fills_missing_quarters() {
        let bars = contexts(&[(SectionType::Chorus, 2)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::PopRock, &memory);

        let beats: Vec<f64> = PopRockFourOnFloor
            .generate_candidates(&ctx)
            .unwrap()
            .iter()
            .map(|c| c.beat.value())
            .collect();
        assert_eq!(beats, vec![2.0, 4.0]);
    }

    #[test]
    fn test_jazz_spang_uses_triplet_skip() {
        let bars = contexts(&[(SectionType::Verse, 2)]);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &[], StyleId::Jazz, &memory);

        let candidates = JazzRideSpang.generate_candidates(&ctx).unwrap();
        let ride = candidates.iter().filter(|c| c.role == DrumRole::Ride).count();
        let pedal = candidates.iter().filter(|c| c.role == DrumRole::PedalHat).count();
        assert_eq!(ride, 6);
        assert_eq!(pedal, 2);
        assert!(candidates
            .iter()
            .any(|c| c.beat == BeatPosition::new(2.6666667)));
    }

    #[test]
    fn test_boom_bap_lays_back() {
        let bars = contexts(&[(SectionType::Verse, 2)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::HipHop, &memory);

        let kicks = HipHopBoomBap.generate_candidates(&ctx).unwrap();
        assert_eq!(kicks.len(), 2);
        assert!(kicks.iter().all(|c| c.timing_hint_ticks == Some(10)));
    }

    #[test]
    fn test_metal_double_kick_density() {
        let bars = contexts(&[(SectionType::Chorus, 2)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::Metal, &memory);
        assert_eq!(MetalDoubleKick.generate_candidates(&ctx).unwrap().len(), 14);
    }
}
