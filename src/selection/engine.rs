// Selection Engine - Weighted choice of operator candidates under hard limits
// Seeded runs sample with ChaCha8; unseeded runs pick greedily; both are reproducible

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::arranger::roles::DrumRole;
use crate::groove::position::BeatPosition;
use crate::operators::types::OperatorFamily;
use super::mapper::{CandidateGroup, OnsetCandidate};
use super::memory::{AntiRepetitionMemory, FillShape};
use super::physicality::LimbUsage;

/// One role of one bar to fill
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub bar: u32,
    pub role: DrumRole,
    pub beats_per_bar: u32,
    pub section_index: Option<usize>,

    /// All candidate groups of the bar; only `role` members are considered
    pub groups: &'a [CandidateGroup],

    /// Anchor positions of `role` in this bar
    pub anchor_positions: &'a BTreeSet<BeatPosition>,

    /// NeverAdd positions of `role` in this bar
    pub never_add: &'a BTreeSet<BeatPosition>,

    /// Added hits per beat, in [0, 1]
    pub density: f64,

    /// Max hits per bar, anchors included
    pub cap: u32,
}

impl SelectionRequest<'_> {
    /// `round(density * beats_per_bar)`, limited by the room left under the cap
    pub fn target_count(&self) -> u32 {
        let density = if self.density.is_finite() {
            self.density.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let wanted = (density * self.beats_per_bar as f64).round() as u32;
        let room = self.cap.saturating_sub(self.anchor_positions.len() as u32);
        wanted.min(room)
    }
}

/// A chosen candidate and the weight it was chosen with
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCandidate {
    pub candidate: OnsetCandidate,
    pub weight: f64,
}

/// Selections made so far in a bar, shared by all roles of that bar
#[derive(Debug, Clone)]
pub struct BarSelectionState {
    pub limbs: LimbUsage,
    group_adds: HashMap<OperatorFamily, u32>,
    operator_adds: HashMap<String, u32>,
}

impl BarSelectionState {
    pub fn new(limbs: LimbUsage) -> Self {
        BarSelectionState {
            limbs,
            group_adds: HashMap::new(),
            operator_adds: HashMap::new(),
        }
    }

    /// Operators that had at least one candidate selected
    pub fn operators_used(&self) -> Vec<String> {
        let mut used: Vec<String> = self.operator_adds.keys().cloned().collect();
        used.sort();
        used
    }
}

/// RNG for one (run seed, bar, role) triple
pub fn role_rng(seed: u64, bar: u32, role: DrumRole) -> ChaCha8Rng {
    let role_index = DrumRole::ALL.iter().position(|r| *r == role).unwrap_or(0) as u64;
    let mixed = seed
        ^ u64::from(bar).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (role_index + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    ChaCha8Rng::seed_from_u64(mixed)
}

/// Stateless selection rules
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionEngine;

struct Weighted<'a> {
    candidate: &'a OnsetCandidate,
    weight: f64,
}

impl SelectionEngine {
    pub fn new() -> Self {
        SelectionEngine
    }

    /// Fill-repetition penalty for an operator's fill in this bar
    fn fill_penalty(
        request: &SelectionRequest<'_>,
        operator_id: &str,
        memory: &AntiRepetitionMemory,
    ) -> f64 {
        let hits: Vec<(DrumRole, BeatPosition)> = request
            .groups
            .iter()
            .flat_map(|group| group.candidates.iter())
            .filter(|c| c.operator_id == operator_id && c.is_fill())
            .map(|c| (c.role, c.beat))
            .collect();
        FillShape::from_hits(&hits, Some(operator_id.to_string()))
            .map(|shape| memory.fill_repetition_penalty(request.section_index, &shape))
            .unwrap_or(0.0)
    }

    /// group bias x candidate bias x (1 - operator penalty) x (1 - fill penalty)
    pub fn weight(
        group_bias: f64,
        candidate: &OnsetCandidate,
        operator_penalty: f64,
        fill_penalty: f64,
    ) -> f64 {
        let weight = group_bias
            * candidate.probability_bias
            * (1.0 - operator_penalty.clamp(0.0, 1.0))
            * (1.0 - fill_penalty.clamp(0.0, 1.0));
        if weight.is_finite() {
            weight.max(0.0)
        } else {
            0.0
        }
    }

    fn pool<'a>(
        &self,
        request: &SelectionRequest<'a>,
        memory: &AntiRepetitionMemory,
    ) -> Vec<Weighted<'a>> {
        let mut fill_penalties: HashMap<&str, f64> = HashMap::new();
        let mut pool = Vec::new();

        for group in request.groups {
            for candidate in &group.candidates {
                if candidate.role != request.role
                    || request.anchor_positions.contains(&candidate.beat)
                    || request.never_add.contains(&candidate.beat)
                {
                    continue;
                }

                let fill_penalty = if candidate.is_fill() {
                    *fill_penalties
                        .entry(candidate.operator_id.as_str())
                        .or_insert_with(|| Self::fill_penalty(request, &candidate.operator_id, memory))
                } else {
                    0.0
                };
                let weight = Self::weight(
                    group.group_bias,
                    candidate,
                    memory.operator_penalty(&candidate.operator_id),
                    fill_penalty,
                );
                if weight > 0.0 {
                    pool.push(Weighted { candidate, weight });
                }
            }
        }

        pool.sort_by(|a, b| a.candidate.candidate_id.cmp(&b.candidate.candidate_id));
        pool
    }

    fn group_cap(request: &SelectionRequest<'_>, family: OperatorFamily) -> u32 {
        request
            .groups
            .iter()
            .find(|group| group.group_id == family)
            .map(|group| group.max_adds_per_bar)
            .unwrap_or(0)
    }

    /// Choose candidates for one role of one bar
    ///
    /// With `rng` the choice is weighted sampling without replacement; without
    /// it the highest weight wins and ties go to the smaller candidate id.
    pub fn select(
        &self,
        request: &SelectionRequest<'_>,
        memory: &AntiRepetitionMemory,
        state: &mut BarSelectionState,
        mut rng: Option<&mut ChaCha8Rng>,
    ) -> Vec<SelectedCandidate> {
        let target = request.target_count();
        let mut pool = self.pool(request, memory);
        let mut taken: HashSet<BeatPosition> = HashSet::new();
        let mut selected = Vec::new();

        while (selected.len() as u32) < target {
            pool.retain(|entry| {
                let c = entry.candidate;
                let group_adds = state.group_adds.get(&c.family).copied().unwrap_or(0);
                let operator_adds = state.operator_adds.get(&c.operator_id).copied().unwrap_or(0);
                !taken.contains(&c.beat)
                    && group_adds < Self::group_cap(request, c.family)
                    && c.max_adds_per_bar.map_or(true, |max| operator_adds < max)
                    && state.limbs.can_play(c.role, c.beat)
            });
            if pool.is_empty() {
                break;
            }

            let index = match rng.as_deref_mut() {
                Some(rng) => weighted_index(&pool, rng),
                None => greedy_index(&pool),
            };
            let entry = pool.remove(index);
            let candidate = entry.candidate;

            taken.insert(candidate.beat);
            *state.group_adds.entry(candidate.family).or_insert(0) += 1;
            *state
                .operator_adds
                .entry(candidate.operator_id.clone())
                .or_insert(0) += 1;
            state.limbs.record(candidate.role, candidate.beat);

            selected.push(SelectedCandidate {
                candidate: candidate.clone(),
                weight: entry.weight,
            });
        }

        if !selected.is_empty() {
            log::debug!(
                "Bar {} {}: selected {} of target {}",
                request.bar,
                request.role,
                selected.len(),
                target
            );
        }

        selected.sort_by(|a, b| a.candidate.beat.cmp(&b.candidate.beat));
        selected
    }
}

/// Highest weight; the pool is sorted by candidate id so the first maximum wins ties
fn greedy_index(pool: &[Weighted<'_>]) -> usize {
    let mut best = 0;
    for (i, entry) in pool.iter().enumerate().skip(1) {
        if entry.weight > pool[best].weight {
            best = i;
        }
    }
    best
}

fn weighted_index(pool: &[Weighted<'_>], rng: &mut ChaCha8Rng) -> usize {
    let total: f64 = pool.iter().map(|entry| entry.weight).sum();
    let mut remaining = rng.gen::<f64>() * total;
    for (i, entry) in pool.iter().enumerate() {
        if remaining < entry.weight {
            return i;
        }
        remaining -= entry.weight;
    }
    pool.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::types::{DrumCandidate, FillRole, OnsetStrength};
    use crate::selection::mapper::{group_candidates, map_candidates};
    use crate::selection::physicality::DEFAULT_MAX_HANDS;

    fn snare(operator: &str, beat: f64, score: f64) -> DrumCandidate {
        DrumCandidate::new(
            operator,
            OperatorFamily::MicroAddition,
            DrumRole::Snare,
            BeatPosition::new(beat),
            OnsetStrength::Offbeat,
            score,
        )
    }

    fn groups(candidates: &[DrumCandidate]) -> Vec<CandidateGroup> {
        group_candidates(map_candidates(candidates, 4).candidates)
    }

    fn request<'a>(
        groups: &'a [CandidateGroup],
        anchors: &'a BTreeSet<BeatPosition>,
        never_add: &'a BTreeSet<BeatPosition>,
        density: f64,
    ) -> SelectionRequest<'a> {
        SelectionRequest {
            bar: 1,
            role: DrumRole::Snare,
            beats_per_bar: 4,
            section_index: Some(0),
            groups,
            anchor_positions: anchors,
            never_add,
            density,
            cap: 8,
        }
    }

    fn beats(selected: &[SelectedCandidate]) -> Vec<f64> {
        selected.iter().map(|s| s.candidate.beat.value()).collect()
    }

    #[test]
    fn test_target_count() {
        let empty = BTreeSet::new();
        let anchors: BTreeSet<BeatPosition> =
            [2.0, 4.0].into_iter().map(BeatPosition::new).collect();

        assert_eq!(request(&[], &empty, &empty, 0.5).target_count(), 2);
        assert_eq!(request(&[], &empty, &empty, 0.3).target_count(), 1);

        let mut capped = request(&[], &anchors, &empty, 1.0);
        capped.cap = 3;
        assert_eq!(capped.target_count(), 1);
    }

    #[test]
    fn test_target_count_density_limited_to_one_per_beat() {
        let empty = BTreeSet::new();
        let mut dense = request(&[], &empty, &empty, 1.5);
        dense.cap = 12;
        assert_eq!(dense.target_count(), 4);

        assert_eq!(request(&[], &empty, &empty, f64::NAN).target_count(), 0);
        assert_eq!(request(&[], &empty, &empty, -0.5).target_count(), 0);
    }

    #[test]
    fn test_greedy_prefers_weight_then_id() {
        let groups = groups(&[
            snare("a_op", 1.75, 0.5),
            snare("b_op", 3.75, 0.9),
            snare("c_op", 2.25, 0.5),
        ]);
        let empty = BTreeSet::new();
        let mut state = BarSelectionState::new(LimbUsage::unlimited());
        let memory = AntiRepetitionMemory::new();

        let selected = SelectionEngine::new().select(
            &request(&groups, &empty, &empty, 0.5),
            &memory,
            &mut state,
            None,
        );
        // b_op wins on weight, then a_op beats c_op on id
        assert_eq!(beats(&selected), vec![1.75, 3.75]);
    }

    #[test]
    fn test_anchor_and_never_add_positions_skipped() {
        let groups = groups(&[
            snare("op", 2.0, 1.0),
            snare("op", 3.75, 1.0),
            snare("op", 1.75, 0.1),
        ]);
        let anchors: BTreeSet<BeatPosition> = [BeatPosition::new(2.0)].into_iter().collect();
        let never_add: BTreeSet<BeatPosition> = [BeatPosition::new(3.75)].into_iter().collect();
        let mut state = BarSelectionState::new(LimbUsage::unlimited());

        let selected = SelectionEngine::new().select(
            &request(&groups, &anchors, &never_add, 1.0),
            &AntiRepetitionMemory::new(),
            &mut state,
            None,
        );
        assert_eq!(beats(&selected), vec![1.75]);
    }

    #[test]
    fn test_operator_cap() {
        let groups = groups(&[
            snare("cluster", 1.25, 1.0).with_max_adds(1),
            snare("cluster", 1.5, 1.0).with_max_adds(1),
            snare("other", 3.25, 0.1),
        ]);
        let empty = BTreeSet::new();
        let mut state = BarSelectionState::new(LimbUsage::unlimited());

        let selected = SelectionEngine::new().select(
            &request(&groups, &empty, &empty, 1.0),
            &AntiRepetitionMemory::new(),
            &mut state,
            None,
        );
        assert_eq!(beats(&selected), vec![1.25, 3.25]);
        assert_eq!(state.operators_used(), vec!["cluster".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_physicality_blocks_third_hand() {
        let groups = groups(&[snare("op", 2.5, 1.0)]);
        let empty = BTreeSet::new();
        let mut limbs = LimbUsage::new(DEFAULT_MAX_HANDS);
        limbs.record(DrumRole::ClosedHat, BeatPosition::new(2.5));
        limbs.record(DrumRole::Crash, BeatPosition::new(2.5));
        let mut state = BarSelectionState::new(limbs);

        let selected = SelectionEngine::new().select(
            &request(&groups, &empty, &empty, 1.0),
            &AntiRepetitionMemory::new(),
            &mut state,
            None,
        );
        assert!(selected.is_empty());
    }

    #[test]
    fn test_operator_penalty_lowers_weight() {
        let groups = groups(&[snare("tired", 1.75, 0.6), snare("fresh", 3.75, 0.5)]);
        let empty = BTreeSet::new();
        let mut memory = AntiRepetitionMemory::new();
        memory.begin_bar(1).unwrap();
        memory.record_operator_use("tired");
        memory.begin_bar(2).unwrap();

        let mut state = BarSelectionState::new(LimbUsage::unlimited());
        let mut req = request(&groups, &empty, &empty, 0.25);
        req.bar = 2;
        let selected = SelectionEngine::new().select(&req, &memory, &mut state, None);
        assert_eq!(selected[0].candidate.operator_id, "fresh");
    }

    #[test]
    fn test_repeated_fill_penalized() {
        let fill = |operator: &str, beat: f64, score: f64| {
            snare(operator, beat, score).with_fill_role(FillRole::FillBody)
        };
        let groups = groups(&[
            fill("roll", 4.0, 0.6),
            fill("roll", 4.25, 0.6),
            fill("roll", 4.5, 0.6),
            fill("roll", 4.75, 0.6),
            fill("build", 3.0, 0.4),
            fill("build", 3.5, 0.4),
        ]);

        let mut memory = AntiRepetitionMemory::new();
        memory.begin_bar(4).unwrap();
        let previous = FillShape::from_hits(
            &[4.0, 4.25, 4.5, 4.75].map(|b| (DrumRole::Snare, BeatPosition::new(b))),
            None,
        )
        .unwrap();
        memory.record_fill(Some(0), previous);
        memory.begin_bar(8).unwrap();

        let empty = BTreeSet::new();
        let mut req = request(&groups, &empty, &empty, 0.25);
        req.bar = 8;
        req.section_index = Some(1);
        let mut state = BarSelectionState::new(LimbUsage::unlimited());
        let selected = SelectionEngine::new().select(&req, &memory, &mut state, None);
        assert_eq!(selected[0].candidate.operator_id, "build");
    }

    #[test]
    fn test_seeded_selection_is_reproducible() {
        let candidates: Vec<DrumCandidate> = (0..12)
            .map(|i| snare("op", 1.0 + i as f64 * 0.25, 0.1 + i as f64 * 0.05))
            .collect();
        let groups = groups(&candidates);
        let empty = BTreeSet::new();
        let req = request(&groups, &empty, &empty, 1.0);
        let memory = AntiRepetitionMemory::new();

        let run = |seed: u64| {
            let mut rng = role_rng(seed, 1, DrumRole::Snare);
            let mut state = BarSelectionState::new(LimbUsage::unlimited());
            beats(&SelectionEngine::new().select(&req, &memory, &mut state, Some(&mut rng)))
        };

        assert_eq!(run(42), run(42));
        assert_eq!(run(42).len(), 4);
    }

    #[test]
    fn test_role_rng_differs_per_bar_and_role() {
        let a: u64 = role_rng(7, 1, DrumRole::Kick).gen();
        let b: u64 = role_rng(7, 2, DrumRole::Kick).gen();
        let c: u64 = role_rng(7, 1, DrumRole::Snare).gen();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
