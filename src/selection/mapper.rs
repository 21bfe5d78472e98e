// Candidate Mapper - Validates operator output and groups it by family
// Invalid candidates are dropped and reported, never passed on

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;
use crate::operators::types::{DrumCandidate, FillRole, OnsetStrength, OperatorFamily};

/// A validated candidate ready for selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetCandidate {
    pub candidate_id: String,
    pub operator_id: String,
    pub family: OperatorFamily,
    pub role: DrumRole,
    pub beat: BeatPosition,
    pub strength: OnsetStrength,

    /// Operator score, used as the candidate's probability bias
    pub probability_bias: f64,

    /// `candidate:<id>` and `operator:<id>`
    pub tags: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_adds_per_bar: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_hint: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_hint_ticks: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_role: Option<FillRole>,
}

impl OnsetCandidate {
    pub fn is_fill(&self) -> bool {
        self.fill_role.is_some()
    }
}

/// Why a candidate was dropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Beat outside `[1, beats_per_bar + 1)`
    BeatOutOfRange { beat: f64 },

    /// Score NaN, infinite or negative
    InvalidScore { score: f64 },
}

/// A dropped candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub candidate_id: String,
    pub operator_id: String,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

/// Result of mapping one bar's candidates
#[derive(Debug, Clone, Default)]
pub struct MappedCandidates {
    pub candidates: Vec<OnsetCandidate>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Candidates of one operator family
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub group_id: OperatorFamily,
    pub candidates: Vec<OnsetCandidate>,

    /// Max selections from this group per bar
    pub max_adds_per_bar: u32,

    /// Mean member score
    pub group_bias: f64,
}

fn validate(candidate: &DrumCandidate, beats_per_bar: u32) -> Result<(), RejectionReason> {
    let beat = candidate.beat.value();
    if !beat.is_finite() || beat < 1.0 || beat >= beats_per_bar as f64 + 1.0 {
        return Err(RejectionReason::BeatOutOfRange { beat });
    }
    if !candidate.score.is_finite() || candidate.score < 0.0 {
        return Err(RejectionReason::InvalidScore {
            score: candidate.score,
        });
    }
    Ok(())
}

/// Validate and convert operator candidates
pub fn map_candidates(candidates: &[DrumCandidate], beats_per_bar: u32) -> MappedCandidates {
    let mut mapped = MappedCandidates::default();

    for candidate in candidates {
        if let Err(reason) = validate(candidate, beats_per_bar) {
            log::warn!(
                "Dropping candidate {} from {}: {:?}",
                candidate.candidate_id,
                candidate.operator_id,
                reason
            );
            mapped.rejected.push(RejectedCandidate {
                candidate_id: candidate.candidate_id.clone(),
                operator_id: candidate.operator_id.clone(),
                reason,
            });
            continue;
        }

        let tags = [
            format!("candidate:{}", candidate.candidate_id),
            format!("operator:{}", candidate.operator_id),
        ]
        .into_iter()
        .collect();

        mapped.candidates.push(OnsetCandidate {
            candidate_id: candidate.candidate_id.clone(),
            operator_id: candidate.operator_id.clone(),
            family: candidate.family,
            role: candidate.role,
            beat: candidate.beat,
            strength: candidate.strength,
            probability_bias: candidate.score,
            tags,
            max_adds_per_bar: candidate.max_adds_per_bar,
            velocity_hint: candidate.velocity_hint,
            timing_hint_ticks: candidate.timing_hint_ticks,
            fill_role: candidate.fill_role,
        });
    }

    mapped
}

/// Group candidates by family, in family registration order
pub fn group_candidates(candidates: Vec<OnsetCandidate>) -> Vec<CandidateGroup> {
    let mut groups = Vec::new();

    for family in OperatorFamily::ALL {
        let members: Vec<OnsetCandidate> = candidates
            .iter()
            .filter(|c| c.family == family)
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }

        let group_bias =
            members.iter().map(|c| c.probability_bias).sum::<f64>() / members.len() as f64;
        groups.push(CandidateGroup {
            group_id: family,
            max_adds_per_bar: members.len() as u32,
            group_bias,
            candidates: members,
        });
    }

    groups
}
