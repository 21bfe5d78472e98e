// Subdivision Transforms - Change how time is kept
// Lifts hats to sixteenths, moves to the ride, adds open-hat barks or triplet feel

use crate::arranger::roles::DrumRole;
use crate::arranger::style::StyleId;
use crate::groove::grid::SubdivisionGrid;
use crate::selection::memory::HatMode;
use crate::song::SectionType;
use super::types::{DrumCandidate, DrumOperator, OperatorContext, OperatorError, OperatorFamily};

/// Full bar of closed-hat sixteenths in energetic sections
pub struct HatLift;

impl DrumOperator for HatLift {
    fn id(&self) -> &'static str {
        "hat_lift"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::SubdivisionTransform
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::ClosedHat) && ctx.energy() >= 0.6)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(SubdivisionGrid::Sixteenth
            .positions_in_bar(ctx.beats_per_bar)
            .into_iter()
            .filter(|beat| !ctx.has_anchor(DrumRole::ClosedHat, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::ClosedHat, beat, 0.4).with_velocity(60))
            .collect())
    }
}

/// Ride eighths in choruses and bridges
pub struct RideSwap;

impl DrumOperator for RideSwap {
    fn id(&self) -> &'static str {
        "ride_swap"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::SubdivisionTransform
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        let section_fits = matches!(
            ctx.section_type(),
            Some(SectionType::Chorus | SectionType::Bridge | SectionType::Solo)
        );
        // Do not sit on the ride for more than four bars in a row
        let worn_out = ctx.memory.last_hat_mode() == Some(HatMode::Ride)
            && ctx.memory.hat_mode_streak() >= 4;
        Ok(section_fits && !worn_out)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(SubdivisionGrid::Eighth
            .positions_in_bar(ctx.beats_per_bar)
            .into_iter()
            .map(|beat| {
                let score = if beat.is_on_beat() { 0.55 } else { 0.45 };
                self.candidate(ctx, DrumRole::Ride, beat, score).with_velocity(85)
            })
            .collect())
    }
}

/// Sixteenth hats in the second half of the bar, leading into a new section
pub struct PartialLift;

impl DrumOperator for PartialLift {
    fn id(&self) -> &'static str {
        "partial_lift"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::SubdivisionTransform
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::ClosedHat) && ctx.bar.in_section_end_window(2))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let half = ctx.beats_per_bar as f64 / 2.0 + 1.0;
        Ok(SubdivisionGrid::Sixteenth
            .positions_in_bar(ctx.beats_per_bar)
            .into_iter()
            .filter(|beat| beat.value() >= half && !ctx.has_anchor(DrumRole::ClosedHat, *beat))
            .map(|beat| self.candidate(ctx, DrumRole::ClosedHat, beat, 0.35).with_velocity(58))
            .collect())
    }
}

/// Open-hat bark on the last offbeat of the bar
pub struct OpenHatAccent;

impl DrumOperator for OpenHatAccent {
    fn id(&self) -> &'static str {
        "open_hat_accent"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::SubdivisionTransform
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(ctx.has_role(DrumRole::ClosedHat) && ctx.energy() >= 0.5)
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        let mut candidates = vec![self
            .candidate(ctx, DrumRole::OpenHat, ctx.last_beat().shifted(0.5), 0.55)
            .with_velocity(90)];
        if ctx.energy() > 0.7 && ctx.beats_per_bar >= 4 {
            let middle = ctx.whole_beats()[1].shifted(0.5);
            candidates.push(self.candidate(ctx, DrumRole::OpenHat, middle, 0.35).with_velocity(85));
        }
        Ok(candidates)
    }
}

/// Triplet hat partials for swung styles
pub struct TripletHatFeel;

impl DrumOperator for TripletHatFeel {
    fn id(&self) -> &'static str {
        "triplet_hat_feel"
    }

    fn family(&self) -> OperatorFamily {
        OperatorFamily::SubdivisionTransform
    }

    fn can_apply(&self, ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
        Ok(matches!(ctx.style, StyleId::Jazz | StyleId::HipHop))
    }

    fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
        Ok(SubdivisionGrid::EighthTriplet
            .positions_in_bar(ctx.beats_per_bar)
            .into_iter()
            .filter(|beat| !beat.is_on_beat())
            .map(|beat| {
                let score = if beat.fraction() > 0.5 { 0.35 } else { 0.15 };
                self.candidate(ctx, DrumRole::ClosedHat, beat, score).with_velocity(55)
            })
            .collect())
    }
}
