// Micro Additions - Ghost notes and pickups around the anchor pattern
// Small, low-velocity decorations that never change the feel of the groove

use crate::arranger::roles::DrumRole;
use crate::groove::grid::backbeats;
use crate::groove::position::BeatPosition;
use super::types::{DrumCandidate, DrumOperator, OperatorContext, OperatorError, OperatorFamily};

/// Ghost-note velocity
const GHOST_VELOCITY: u8 = 35;

/// Above this many ghost notes per bar the ghost operators back off
const GHOST_SATURATION: f64 = 3.0;

fn snare_backbeats(ctx: &OperatorContext<'_>) -> Vec<BeatPosition> {
    backbeats(ctx.beats_per_bar)
        .into_iter()
        .filter(|beat| ctx.has_anchor(DrumRole::Snare, *beat))
        .collect()
}

/// Snare ghost a sixteenth before each backbeat
pub struct GhostBeforeBackbeat;

impl DrumOperator for GhostBeforeBackbeat {
    fn id(&self) -> &'static str {
        "ghost_before_backbeat"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(!snare_backbeats(ctx).is_empty()
            && ctx.memory.ghost_note_frequency() < GHOST_SATURATION)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(snare_backbeats(ctx)
            .into_iter()
            .map(|beat| beat.shifted(-0.25))
            .filter(|beat| ctx.in_bar(*beat))
            .map(|beat| {
                self.candidate(ctx, DrumRole::Snare, beat, 0.6)
                    .with_velocity(GHOST_VELOCITY)
            })
            .collect())
    }
}

/// Snare ghost a sixteenth after each backbeat
pub struct GhostAfterBackbeat;

impl DrumOperator for GhostAfterBackbeat {
    fn id(&self) -> &'static str {
        "ghost_after_backbeat"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(!snare_backbeats(ctx).is_empty()
            && ctx.memory.ghost_note_frequency() < GHOST_SATURATION)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(snare_backbeats(ctx)
            .into_iter()
            .map(|beat| beat.shifted(0.25))
            .filter(|beat| ctx.in_bar(*beat))
            .map(|beat| {
                self.candidate(ctx, DrumRole::Snare, beat, 0.5)
                    .with_velocity(GHOST_VELOCITY)
            })
            .collect())
    }
}

/// Kick a sixteenth before an anchored kick
pub struct KickPickup;

impl DrumOperator for KickPickup {
    fn id(&self) -> &'static str {
        "kick_pickup"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::Kick))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(ctx
            .anchor_beats(DrumRole::Kick)
            .into_iter()
            .map(|beat| beat.shifted(-0.25))
            .filter(|beat| ctx.in_bar(*beat) && !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.5).with_velocity(80))
            .collect())
    }
}

/// Second kick an eighth after an anchored kick
pub struct KickDoubling;

impl DrumOperator for KickDoubling {
    fn id(&self) -> &'static str {
        "kick_doubling"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::Kick) && ctx.energy() >= 0.5)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(ctx
            .anchor_beats(DrumRole::Kick)
            .into_iter()
            .map(|beat| beat.shifted(0.5))
            .filter(|beat| ctx.in_bar(*beat) && !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.45).with_velocity(85))
            .collect())
    }
}

/// Closed-hat sixteenths between the anchored eighths
pub struct HatEmbellishment;

impl DrumOperator for HatEmbellishment {
    fn id(&self) -> &'static str {
        "hat_embellishment"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::ClosedHat))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let mut candidates = Vec::new();
        for beat in ctx.whole_beats() {
            for offset in [0.25, 0.75] {
                let position = beat.shifted(offset);
                if !ctx.has_anchor(DrumRole::ClosedHat, position) {
                    candidates.push(
                        self.candidate(ctx, DrumRole::ClosedHat, position, 0.35)
                            .with_velocity(55),
                    );
                }
            }
        }
        Ok(candidates)
    }
}

/// Pair of ghosts after the non-backbeat beats, in quieter sections
pub struct GhostCluster;

impl DrumOperator for GhostCluster {
    fn id(&self) -> &'static str {
        "ghost_cluster"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::Snare)
            && ctx.energy() <= 0.7
            && ctx.memory.ghost_note_frequency() < GHOST_SATURATION)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let backbeat_positions = backbeats(ctx.beats_per_bar);
        let mut candidates = Vec::new();
        for beat in ctx.whole_beats() {
            if backbeat_positions.contains(&beat) {
                continue;
            }
            for offset in [0.25, 0.5] {
                let position = beat.shifted(offset);
                if !ctx.has_anchor(DrumRole::Snare, position) {
                    candidates.push(
                        self.candidate(ctx, DrumRole::Snare, position, 0.3)
                            .with_velocity(GHOST_VELOCITY - 5)
                            .with_max_adds(2),
                    );
                }
            }
        }
        Ok(candidates)
    }
}

/// Floor-tom eighth leading out of a phrase
pub struct FloorTomPickup;

impl DrumOperator for FloorTomPickup {
    fn id(&self) -> &'static str {
        "floor_tom_pickup"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::MicroAddition
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.is_phrase_end())
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let beat = ctx.last_beat().shifted(0.5);
        Ok(vec![self.candidate(ctx, DrumRole::FloorTom, beat, 0.3).with_velocity(70)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::style::StyleId;
    use crate::operators::types::test_support::{contexts, rock_anchors};
    use crate::operators::types::OnsetStrength;
    use crate::selection::memory::AntiRepetitionMemory;
    use crate::song::SectionType;

    fn beats(candidates: &[DrumCandidate]) -> Vec<f64> {
        candidates.iter().map(|c| c.beat.value()).collect()
    }

    #[test]
    fn test_ghosts_around_backbeats() {
        let bars = contexts(&[(SectionType::Verse, 4)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::PopRock, &memory);

        let before = GhostBeforeBackbeat.generate_candidates(&ctx).unwrap();
        assert_eq!(beats(&before), vec![1.75, 3.75]);
        assert!(before.iter().all(|c| c.velocity_hint == Some(GHOST_VELOCITY)));
        assert!(before.iter().all(|c| c.strength == OnsetStrength::Pickup));

        let after = GhostAfterBackbeat.generate_candidates(&ctx).unwrap();
        assert_eq!(beats(&after), vec![2.25, 4.25]);
    }

    #[test]
    fn test_ghosts_back_off_when_saturated() {
        let bars = contexts(&[(SectionType::Verse, 4)]);
        let anchors = rock_anchors(2);
        let mut memory = AntiRepetitionMemory::new();
        memory.begin_bar(1).unwrap();
        memory.record_ghost_notes(6);

        let ctx = OperatorContext::new(&bars[1], 4, &anchors, StyleId::PopRock, &memory);
        assert!(!GhostBeforeBackbeat.can_apply(&ctx).unwrap());
        assert!(!GhostCluster.can_apply(&ctx).unwrap());
    }

    #[test]
    fn test_kick_operators() {
        let bars = contexts(&[(SectionType::Chorus, 4)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::PopRock, &memory);

        let pickups = KickPickup.generate_candidates(&ctx).unwrap();
        assert_eq!(beats(&pickups), vec![2.75]);

        assert!(KickDoubling.can_apply(&ctx).unwrap());
        assert_eq!(beats(&KickDoubling.generate_candidates(&ctx).unwrap()), vec![1.5, 3.5]);
    }

    #[test]
    fn test_hat_embellishment_fills_sixteenths() {
        let bars = contexts(&[(SectionType::Verse, 4)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();
        let ctx = OperatorContext::new(&bars[0], 4, &anchors, StyleId::PopRock, &memory);

        let hats = HatEmbellishment.generate_candidates(&ctx).unwrap();
        assert_eq!(hats.len(), 8);
        assert!(hats.iter().all(|c| !c.beat.is_on_beat()));
    }

    #[test]
    fn test_floor_tom_only_at_phrase_end() {
        let bars = contexts(&[(SectionType::Verse, 4)]);
        let anchors = rock_anchors(1);
        let memory = AntiRepetitionMemory::new();

        let first = OperatorContext::new(&bars[0], 4, &anchors, StyleId::PopRock, &memory);
        assert!(!FloorTomPickup.can_apply(&first).unwrap());

        let last = OperatorContext::new(&bars[3], 4, &anchors, StyleId::PopRock, &memory);
        assert!(FloorTomPickup.can_apply(&last).unwrap());
        assert_eq!(beats(&FloorTomPickup.generate_candidates(&last).unwrap()), vec![4.5]);
    }
}
