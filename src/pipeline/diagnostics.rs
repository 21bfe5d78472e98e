// Diagnostics - Everything a run tolerated instead of failing on
// Operator failures, dropped candidates and protection conflicts

use serde::{Deserialize, Serialize};

use crate::operators::OperatorFailure;
use crate::protection::ProtectionConflict;
use crate::selection::RejectedCandidate;

/// One tolerated problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    OperatorFailure {
        operator_id: String,
        bar: u32,
        message: String,
    },

    RejectedCandidate {
        bar: u32,
        #[serde(flatten)]
        candidate: RejectedCandidate,
    },

    ProtectionConflict(ProtectionConflict),
}

impl Diagnostic {
    /// Bar the problem occurred in
    pub fn bar(&self) -> u32 {
        match self {
            Diagnostic::OperatorFailure { bar, .. } => *bar,
            Diagnostic::RejectedCandidate { bar, .. } => *bar,
            Diagnostic::ProtectionConflict(conflict) => conflict.bar,
        }
    }
}

/// Diagnostics of a run, in the order they were raised
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operator_failure(&mut self, failure: &OperatorFailure) {
        self.entries.push(Diagnostic::OperatorFailure {
            operator_id: failure.operator_id.clone(),
            bar: failure.bar,
            message: failure.error.to_string(),
        });
    }

    pub fn record_rejected(&mut self, bar: u32, candidate: RejectedCandidate) {
        self.entries.push(Diagnostic::RejectedCandidate { bar, candidate });
    }

    pub fn record_conflict(&mut self, conflict: ProtectionConflict) {
        log::warn!(
            "Bar {}: {} at {} is both MustHit and NeverAdd; keeping the hit",
            conflict.bar,
            conflict.role,
            conflict.beat
        );
        self.entries.push(Diagnostic::ProtectionConflict(conflict));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn operator_failures(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::OperatorFailure { .. }))
    }

    pub fn rejected_candidates(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::RejectedCandidate { .. }))
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ProtectionConflict> {
        self.entries.iter().filter_map(|d| match d {
            Diagnostic::ProtectionConflict(conflict) => Some(conflict),
            _ => None,
        })
    }

    /// Entries raised in one bar
    pub fn for_bar(&self, bar: u32) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.bar() == bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::roles::DrumRole;
    use crate::groove::position::BeatPosition;
    use crate::operators::OperatorError;
    use crate::selection::RejectionReason;

    fn sample() -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_operator_failure(&OperatorFailure {
            operator_id: "build_fill".into(),
            bar: 4,
            error: OperatorError::UnsupportedMeter {
                operator_id: "build_fill".into(),
                beats_per_bar: 1,
            },
        });
        diagnostics.record_rejected(
            2,
            RejectedCandidate {
                candidate_id: "x:snare:9.000".into(),
                operator_id: "x".into(),
                reason: RejectionReason::BeatOutOfRange { beat: 9.0 },
            },
        );
        diagnostics.record_conflict(ProtectionConflict {
            bar: 4,
            role: DrumRole::Snare,
            beat: BeatPosition::new(2.0),
        });
        diagnostics
    }

    #[test]
    fn test_filters() {
        let diagnostics = sample();
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.operator_failures().count(), 1);
        assert_eq!(diagnostics.rejected_candidates().count(), 1);
        assert_eq!(diagnostics.conflicts().count(), 1);
        assert_eq!(diagnostics.for_bar(4).count(), 2);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        let entries = json["entries"].as_array().unwrap();

        assert_eq!(entries[0]["kind"], "operator_failure");
        assert_eq!(entries[0]["operator_id"], "build_fill");
        assert_eq!(entries[1]["kind"], "rejected_candidate");
        assert_eq!(entries[1]["reason"], "beat_out_of_range");
        assert_eq!(entries[2]["kind"], "protection_conflict");
        assert_eq!(entries[2]["role"], "snare");
    }
}
