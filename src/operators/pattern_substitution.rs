// Pattern Substitutions - Alternative kick and snare figures
// Anchors stay in place; these add the notes that make the figure read differently

use crate::arranger::roles::DrumRole;
use crate::groove::grid::backbeats;
use crate::song::SectionType;
use super::types::{DrumCandidate, DrumOperator, OperatorContext, OperatorError, OperatorFamily};

/// Side-stick doubling the backbeat in quiet sections
pub struct BackbeatVariant;

impl DrumOperator for BackbeatVariant {
    fn id(&self) -> &'static str {
        "backbeat_variant"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PatternSubstitution
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.bar.has_section() && ctx.energy() < 0.5)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(backbeats(ctx.beats_per_bar)
            .into_iter()
            .map(|beat| self.candidate(ctx, DrumRole::SideStick, beat, 0.4).with_velocity(90))
            .collect())
    }
}

/// Pushed kicks on the "and" of each backbeat
pub struct KickPatternVariant;

impl DrumOperator for KickPatternVariant {
    fn id(&self) -> &'static str {
        "kick_pattern_variant"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PatternSubstitution
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::Kick)
            && matches!(
                ctx.section_type(),
                Some(SectionType::Verse | SectionType::PreChorus | SectionType::Chorus)
            ))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(backbeats(ctx.beats_per_bar)
            .into_iter()
            .map(|beat| beat.shifted(0.5))
            .filter(|beat| ctx.in_bar(*beat) && !ctx.has_anchor(DrumRole::Kick, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::Kick, beat, 0.4).with_velocity(95))
            .collect())
    }
}

/// Snare on the middle of the bar for a half-time feel
pub struct HalfTimeFeel;

impl DrumOperator for HalfTimeFeel {
    fn id(&self) -> &'static str {
        "half_time_feel"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PatternSubstitution
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(matches!(
            ctx.section_type(),
            Some(SectionType::Breakdown | SectionType::Bridge | SectionType::Outro)
        ))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        if ctx.beats_per_bar % 2 != 0 {
            return Ok(Vec::new());
        }
        let middle = ctx.whole_beats()[(ctx.beats_per_bar / 2) as usize];
        if ctx.has_anchor(DrumRole::Snare, middle) {
            return Ok(Vec::new());
        }
        Ok(vec![self.candidate(ctx, DrumRole::Snare, middle, 0.35).with_velocity(105)])
    }
}

/// Snare on every offbeat for a double-time push
pub struct DoubleTimeFeel;

impl DrumOperator for DoubleTimeFeel {
    fn id(&self) -> &'static str {
        "double_time_feel"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::PatternSubstitution
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::Snare) && ctx.energy() >= 0.9)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(ctx
            .whole_beats()
            .into_iter()
            .map(|beat| beat.shifted(0.5))
            .map(|beat| {
                self.candidate(ctx, DrumRole::Snare, beat, 0.25)
                    .with_velocity(90)
                    .with_max_adds(2)
            })
            .collect())
    }
}
