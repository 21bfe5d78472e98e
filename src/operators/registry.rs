// Operator Registry - Fixed registration table and isolated invocation
// A failing operator loses its own contribution and nothing else

use thiserror::Error;

use crate::arranger::style::OperatorAllowList;
use super::micro_addition::*;
use super::pattern_substitution::*;
use super::phrase_punctuation::*;
use super::style_idiom::*;
use super::subdivision_transform::*;
use super::types::{DrumCandidate, DrumOperator, OperatorContext, OperatorError, OperatorFamily};

/// An operator error tied to the operator and bar that raised it
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Operator {operator_id} failed in bar {bar}: {error}")]
pub struct OperatorFailure {
    pub operator_id: String,
    pub bar: u32,
    #[source]
    pub error: OperatorError,
}

/// Candidates from every operator that ran for a bar
#[derive(Debug, Clone, Default)]
pub struct GeneratedCandidates {
    /// Candidates in registration order
    pub candidates: Vec<DrumCandidate>,

    /// Operators that contributed at least one candidate
    pub contributors: Vec<String>,

    /// Operators that failed and were skipped
    pub failures: Vec<OperatorFailure>,
}

/// Ordered set of operators
#[derive(Default)]
pub struct OperatorRegistry {
    operators: Vec<Box<dyn DrumOperator>>,
}

impl OperatorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard table of 28 operators
    pub fn standard() -> Self {
        let mut registry = Self::new();

        // Micro additions
        registry.register(Box::new(GhostBeforeBackbeat));
        registry.register(Box::new(GhostAfterBackbeat));
        registry.register(Box::new(KickPickup));
        registry.register(Box::new(KickDoubling));
        registry.register(Box::new(HatEmbellishment));
        registry.register(Box::new(GhostCluster));
        registry.register(Box::new(FloorTomPickup));

        // Subdivision transforms
        registry.register(Box::new(HatLift));
        registry.register(Box::new(RideSwap));
        registry.register(Box::new(PartialLift));
        registry.register(Box::new(OpenHatAccent));
        registry.register(Box::new(TripletHatFeel));

        // Phrase punctuation
        registry.register(Box::new(CrashOnOne));
        registry.register(Box::new(SetupHit));
        registry.register(Box::new(BuildFill));
        registry.register(Box::new(TomRunFill));
        registry.register(Box::new(SnareRollFill));
        registry.register(Box::new(TurnaroundFill));

        // Pattern substitutions
        registry.register(Box::new(BackbeatVariant));
        registry.register(Box::new(KickPatternVariant));
        registry.register(Box::new(HalfTimeFeel));
        registry.register(Box::new(DoubleTimeFeel));

        // Style idioms
        registry.register(Box::new(PopRockFourOnFloor));
        registry.register(Box::new(FunkGhostGrid));
        registry.register(Box::new(FunkKickSyncopation));
        registry.register(Box::new(JazzRideSpang));
        registry.register(Box::new(MetalDoubleKick));
        registry.register(Box::new(HipHopBoomBap));

        registry
    }

    /// Append an operator; ids already registered are ignored
    pub fn register(&mut self, operator: Box<dyn DrumOperator>) {
        if self.contains(operator.id()) {
            log::warn!("Operator {} already registered, ignoring", operator.id());
            return;
        }
        self.operators.push(operator);
    }

    pub fn contains(&self, operator_id: &str) -> bool {
        self.operators.iter().any(|op| op.id() == operator_id)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Operator ids in registration order
    pub fn ids(&self) -> Vec<&'static str> {
        self.operators.iter().map(|op| op.id()).collect()
    }

    /// Family of a registered operator
    pub fn family_of(&self, operator_id: &str) -> Option<OperatorFamily> {
        self.operators
            .iter()
            .find(|op| op.id() == operator_id)
            .map(|op| op.family())
    }

    /// Run every allowed operator against a bar
    ///
    /// Errors are isolated per operator and collected in `failures`. With
    /// `fail_fast` the first error is returned instead.
    pub fn generate(
        &self,
        ctx: &OperatorContext<'_>,
        allow_list: &OperatorAllowList,
        fail_fast: bool,
    ) -> Result<GeneratedCandidates, OperatorFailure> {
        let mut generated = GeneratedCandidates::default();

        for operator in self.operators.iter().filter(|op| allow_list.allows(op.id())) {
            let result = operator.can_apply(ctx).and_then(|applies| {
                if applies {
                    operator.generate_candidates(ctx)
                } else {
                    Ok(Vec::new())
                }
            });

            match result {
                Ok(candidates) => {
                    if !candidates.is_empty() {
                        generated.contributors.push(operator.id().to_string());
                    }
                    generated.candidates.extend(candidates);
                }
                Err(error) => {
                    let failure = OperatorFailure {
                        operator_id: operator.id().to_string(),
                        bar: ctx.bar.bar,
                        error,
                    };
                    if fail_fast {
                        return Err(failure);
                    }
                    log::warn!("{}; dropping its candidates", failure);
                    generated.failures.push(failure);
                }
            }
        }

        Ok(generated)
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.ids())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_operators {
    use super::*;
    use crate::arranger::roles::DrumRole;
    use crate::groove::position::BeatPosition;

    /// Always fails while generating
    pub struct BrokenOperator;

    impl DrumOperator for BrokenOperator {
        fn id(&self) -> &'static str {
            "broken"
        }

        fn family(&self) -> OperatorFamily {
            OperatorFamily::MicroAddition
        }

        fn can_apply(&self, _ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
            Ok(true)
        }

        fn generate_candidates(&self, _ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
            Err(OperatorError::Failed {
                operator_id: self.id().to_string(),
                message: "boom".to_string(),
            })
        }
    }

    /// Always proposes a snare ghost on the "a" of beat 1
    pub struct FixedGhost;

    impl DrumOperator for FixedGhost {
        fn id(&self) -> &'static str {
            "fixed_ghost"
        }

        fn family(&self) -> OperatorFamily {
            OperatorFamily::MicroAddition
        }

        fn can_apply(&self, _ctx: &OperatorContext<'_>) -> Result<bool, OperatorError> {
            Ok(true)
        }

        fn generate_candidates(&self, ctx: &OperatorContext<'_>) -> Result<Vec<DrumCandidate>, OperatorError> {
            Ok(vec![self
                .candidate(ctx, DrumRole::Snare, BeatPosition::new(1.75), 1.0)
                .with_velocity(40)])
        }
    }
}
