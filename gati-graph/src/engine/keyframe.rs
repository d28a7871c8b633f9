//! Keyframe selection over the sliding window.
//!
//! Every accepted frame triggers an evaluation of the accumulated slots
//! `1..=N` against slot 0 (the current keyframe):
//!
//! ```text
//! d_k          = transform(slot 0, slot k)
//! motion[k]    = |d_k.xy|
//! rotation[k]  = d_k.θ in degrees
//! score[k]     = exp(-|atan2(d_k.y, d_k.x) + d_k.θ|)
//! ```
//!
//! Slots that moved more than `veto_min_motion` but drifted sideways or
//! turned too far get a zero score. A keyframe is declared when the newest
//! score falls off, when the window is full, or when the first step was
//! already large. The pivot slot becomes the next keyframe and every slot
//! scoring above the threshold contributes a rotation-only relation.

use serde::{Deserialize, Serialize};

use super::estimator::TransformEstimator;
use super::graph::Relation;
use super::window::FrameWindow;
use crate::config::defaults;
use crate::core::types::Pose2D;

/// Configuration for keyframe selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeSelectorConfig {
    /// Ratio of the best score a slot must exceed to count as evidence.
    #[serde(default = "defaults::keyframe_threshold")]
    pub keyframe_threshold: f64,

    /// Motion above which the lateral and rotation vetoes apply.
    #[serde(default = "defaults::veto_min_motion")]
    pub veto_min_motion: f64,

    /// Maximum sideways displacement for a moving slot.
    #[serde(default = "defaults::max_lateral")]
    pub max_lateral: f64,

    /// Maximum heading change (degrees) for a moving slot.
    #[serde(default = "defaults::max_rotation_deg")]
    pub max_rotation_deg: f64,

    /// Windows holding more accumulated frames than this always produce a keyframe.
    #[serde(default = "defaults::max_accumulated_frames")]
    pub max_accumulated_frames: usize,

    /// First-slot motion above which a keyframe is forced.
    #[serde(default = "defaults::large_first_motion")]
    pub large_first_motion: f64,

    /// Odometry acceptances needed since the previous solve before a
    /// keyframe event runs the solver.
    #[serde(default = "defaults::min_accepted_per_solve")]
    pub min_accepted_per_solve: usize,
}

impl Default for KeyframeSelectorConfig {
    fn default() -> Self {
        Self {
            keyframe_threshold: defaults::keyframe_threshold(),
            veto_min_motion: defaults::veto_min_motion(),
            max_lateral: defaults::max_lateral(),
            max_rotation_deg: defaults::max_rotation_deg(),
            max_accumulated_frames: defaults::max_accumulated_frames(),
            large_first_motion: defaults::large_first_motion(),
            min_accepted_per_solve: defaults::min_accepted_per_solve(),
        }
    }
}

/// Score of one accumulated slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotScore {
    /// Window slot (1..=N).
    pub slot: usize,
    /// Pose node of the slot.
    pub node: u64,
    /// Transform from slot 0.
    pub delta: Pose2D,
    /// Translation magnitude of `delta`.
    pub motion_norm: f64,
    /// Heading change of `delta` in degrees.
    pub rotation_deg: f64,
    /// Direction score, zero if vetoed.
    pub score: f64,
    /// True if a heuristic veto zeroed the score.
    pub vetoed: bool,
}

impl SlotScore {
    /// Score `delta` for `slot`, applying the motion vetoes.
    pub fn new(slot: usize, node: u64, delta: Pose2D, config: &KeyframeSelectorConfig) -> Self {
        let motion_norm = delta.translation_norm();
        let rotation_deg = delta.theta_degrees();
        let vetoed = motion_norm > config.veto_min_motion
            && (delta.y.abs() > config.max_lateral || rotation_deg.abs() > config.max_rotation_deg);
        let score = if vetoed { 0.0 } else { delta.direction_score() };

        Self {
            slot,
            node,
            delta,
            motion_norm,
            rotation_deg,
            score,
            vetoed,
        }
    }
}

/// Scores of all accumulated slots plus their two rankings.
///
/// Both rankings hold positions into [`slots`](Self::slots), ascending, with
/// ties kept in slot order.
#[derive(Debug, Clone, Default)]
pub struct KeyframeScores {
    slots: Vec<SlotScore>,
    by_score: Vec<usize>,
    by_rotation: Vec<usize>,
}

impl KeyframeScores {
    /// Rank the given slot scores (ordered by slot).
    pub fn from_slots(slots: Vec<SlotScore>) -> Self {
        let mut by_score: Vec<usize> = (0..slots.len()).collect();
        by_score.sort_by(|&a, &b| slots[a].score.total_cmp(&slots[b].score));

        let mut by_rotation: Vec<usize> = (0..slots.len()).collect();
        by_rotation.sort_by(|&a, &b| {
            slots[a]
                .rotation_deg
                .abs()
                .total_cmp(&slots[b].rotation_deg.abs())
        });

        Self {
            slots,
            by_score,
            by_rotation,
        }
    }

    /// Per-slot scores, oldest first.
    pub fn slots(&self) -> &[SlotScore] {
        &self.slots
    }

    /// Number of scored slots (N).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing was scored.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Score of a window slot.
    pub fn get(&self, slot: usize) -> Option<&SlotScore> {
        slot.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    /// Window slots in ascending score order.
    pub fn ranked_by_score(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_score.iter().map(|&i| self.slots[i].slot)
    }

    /// Window slots in ascending |rotation| order.
    pub fn ranked_by_rotation(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_rotation.iter().map(|&i| self.slots[i].slot)
    }

    /// Highest-scoring slot (last in score order).
    pub fn best(&self) -> Option<&SlotScore> {
        self.by_score.last().map(|&i| &self.slots[i])
    }
}

/// Conditions that declared a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct KeyframeTriggers {
    /// Newest score fell below both its predecessor and the threshold.
    pub score_drop: bool,
    /// Window exceeded `max_accumulated_frames`.
    pub window_full: bool,
    /// First slot moved more than `large_first_motion`.
    pub large_first_motion: bool,
}

impl KeyframeTriggers {
    /// True if any condition holds.
    pub fn any(&self) -> bool {
        self.score_drop || self.window_full || self.large_first_motion
    }
}

/// A declared keyframe.
#[derive(Debug, Clone)]
pub struct KeyframeDecision {
    /// Window slot that becomes the next keyframe.
    pub pivot: usize,
    /// Pose node of the pivot slot.
    pub pivot_node: u64,
    /// True when no rotation-ranked slot cleared the threshold and the
    /// best-scoring slot was used instead.
    pub fallback_pivot: bool,
    /// `keyframe_threshold` times the best score.
    pub threshold: f64,
    /// What declared the keyframe.
    pub triggers: KeyframeTriggers,
    /// Rotation-only relations from the previous keyframe.
    pub relations: Vec<Relation>,
    /// Scores the decision was made from.
    pub scores: KeyframeScores,
}

/// Decides when the window produces a keyframe.
#[derive(Debug, Clone)]
pub struct KeyframeSelector {
    config: KeyframeSelectorConfig,
    rotation_sigma: f64,
}

impl KeyframeSelector {
    /// Create a selector emitting rotation-only relations with `rotation_sigma`.
    pub fn new(config: KeyframeSelectorConfig, rotation_sigma: f64) -> Self {
        Self {
            config,
            rotation_sigma,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &KeyframeSelectorConfig {
        &self.config
    }

    /// Score the window and decide whether it produces a keyframe.
    ///
    /// Transforms from slot 0 are computed once per slot and cached in the
    /// window; scores and rankings are rebuilt on every call.
    pub fn evaluate<F, E>(
        &self,
        window: &mut FrameWindow<F>,
        estimator: &mut E,
        key_node: u64,
    ) -> Option<KeyframeDecision>
    where
        E: TransformEstimator<F> + ?Sized,
    {
        let scores = self.score_window(window, estimator);
        self.decide(scores, key_node)
    }

    /// Score every accumulated slot that has a pose node.
    pub fn score_window<F, E>(&self, window: &mut FrameWindow<F>, estimator: &mut E) -> KeyframeScores
    where
        E: TransformEstimator<F> + ?Sized,
    {
        let mut slots = Vec::with_capacity(window.accumulated());
        for slot in 1..=window.accumulated() {
            let Some(node) = window.node(slot) else {
                continue;
            };
            let delta = match window.keyframe_delta(slot) {
                Some(delta) => delta,
                None => {
                    let (Some(key), Some(frame)) = (window.frame(0), window.frame(slot)) else {
                        continue;
                    };
                    let delta = estimator.estimate(&key.data, &frame.data);
                    window.set_keyframe_delta(slot, delta);
                    delta
                }
            };
            slots.push(SlotScore::new(slot, node, delta, &self.config));
        }

        let scores = KeyframeScores::from_slots(slots);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Keyframe scores: {}", join_values(&scores, |s| s.score));
            log::debug!("Keyframe motion: {}", join_values(&scores, |s| s.motion_norm));
            log::debug!("Keyframe rotation: {}", join_values(&scores, |s| s.rotation_deg));
            log::debug!(
                "Ranked by score: {:?}, by rotation: {:?}",
                scores.ranked_by_score().collect::<Vec<_>>(),
                scores.ranked_by_rotation().collect::<Vec<_>>()
            );
        }
        scores
    }

    /// Decide from precomputed scores.
    ///
    /// Returns `None` unless at least two slots are scored and a trigger
    /// fires.
    pub fn decide(&self, scores: KeyframeScores, key_node: u64) -> Option<KeyframeDecision> {
        let n = scores.len();
        if n < 2 {
            return None;
        }

        let best = scores.best()?.score;
        let threshold = self.config.keyframe_threshold * best;
        let newest = &scores.slots()[n - 1];
        let previous = &scores.slots()[n - 2];

        let triggers = KeyframeTriggers {
            score_drop: newest.score < previous.score && newest.score < threshold,
            window_full: n > self.config.max_accumulated_frames,
            large_first_motion: scores.slots()[0].motion_norm > self.config.large_first_motion,
        };
        if !triggers.any() {
            return None;
        }

        // Largest rotation first.
        let found = scores
            .by_rotation
            .iter()
            .rev()
            .map(|&i| &scores.slots[i])
            .find(|s| s.score > threshold);
        let (pivot, fallback_pivot) = match found {
            Some(slot) => (*slot, false),
            None => {
                let best = *scores.best()?;
                log::warn!(
                    "No slot cleared keyframe threshold {:.4}, falling back to slot {}",
                    threshold,
                    best.slot
                );
                (best, true)
            }
        };

        let relations: Vec<Relation> = scores
            .slots()
            .iter()
            .filter(|s| s.slot == pivot.slot || s.score > threshold)
            .map(|s| Relation::rotation_only(key_node, s.node, s.delta.theta, self.rotation_sigma))
            .collect();

        log::info!(
            "Keyframe declared at node {} (slot {}/{}, {} rotation relations, {:?})",
            pivot.node,
            pivot.slot,
            n,
            relations.len(),
            triggers
        );

        Some(KeyframeDecision {
            pivot: pivot.slot,
            pivot_node: pivot.node,
            fallback_pivot,
            threshold,
            triggers,
            relations,
            scores,
        })
    }
}

fn join_values(scores: &KeyframeScores, value: impl Fn(&SlotScore) -> f64) -> String {
    scores
        .slots()
        .iter()
        .map(|s| format!("{:.3}", value(s)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Timestamped;
    use approx::assert_relative_eq;

    fn selector() -> KeyframeSelector {
        KeyframeSelector::new(KeyframeSelectorConfig::default(), 0.01)
    }

    /// Slot with an explicit score and heading change.
    fn slot(slot: usize, score: f64, rotation_deg: f64) -> SlotScore {
        SlotScore {
            slot,
            node: 10 + slot as u64,
            delta: Pose2D::new(slot as f64, 0.0, rotation_deg.to_radians()),
            motion_norm: slot as f64,
            rotation_deg,
            score,
            vetoed: false,
        }
    }

    #[test]
    fn test_lateral_veto_zeroes_score() {
        let config = KeyframeSelectorConfig::default();
        let s = SlotScore::new(1, 1, Pose2D::new(1.5, 2.5, -1.03), &config);
        assert!(s.vetoed);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_rotation_veto_zeroes_score() {
        let config = KeyframeSelectorConfig::default();
        let s = SlotScore::new(1, 1, Pose2D::new(2.0, 0.0, 100f64.to_radians()), &config);
        assert!(s.vetoed);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_small_motion_is_never_vetoed() {
        let config = KeyframeSelectorConfig::default();
        let s = SlotScore::new(1, 1, Pose2D::new(0.1, 0.5, 0.0), &config);
        assert!(!s.vetoed);
        assert!(s.score > 0.0);
    }

    #[test]
    fn test_rankings_are_ascending_and_stable() {
        let scores = KeyframeScores::from_slots(vec![
            slot(1, 0.5, 10.0),
            slot(2, 0.2, -3.0),
            slot(3, 0.5, 3.0),
        ]);

        assert_eq!(scores.ranked_by_score().collect::<Vec<_>>(), vec![2, 1, 3]);
        assert_eq!(scores.ranked_by_rotation().collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(scores.best().map(|s| s.slot), Some(3));
    }

    #[test]
    fn test_single_slot_never_decides() {
        let scores = KeyframeScores::from_slots(vec![slot(1, 0.01, 0.0)]);
        assert!(selector().decide(scores, 0).is_none());
    }

    #[test]
    fn test_no_trigger_no_keyframe() {
        let scores = KeyframeScores::from_slots(vec![slot(1, 0.9, 0.0), slot(2, 0.95, 1.0)]);
        assert!(selector().decide(scores, 0).is_none());
    }

    #[test]
    fn test_score_drop_declares_keyframe() {
        let scores = KeyframeScores::from_slots(vec![slot(1, 0.9, 1.0), slot(2, 0.3, 5.0)]);

        let decision = selector().decide(scores, 7).unwrap();

        assert!(decision.triggers.score_drop);
        assert!(!decision.triggers.window_full);
        assert_eq!(decision.pivot, 1);
        assert_relative_eq!(decision.threshold, 0.45);
        assert_eq!(decision.relations.len(), 1);
        assert!(matches!(
            decision.relations[0],
            Relation::RotationOnly { from: 7, to: 11, .. }
        ));
    }

    #[test]
    fn test_five_slot_window() {
        let scores = KeyframeScores::from_slots(vec![
            slot(1, 0.9, 2.0),
            slot(2, 0.8, 6.0),
            slot(3, 0.95, 4.0),
            slot(4, 0.1, 12.0),
            slot(5, 0.05, 15.0),
        ]);

        let decision = selector().decide(scores, 0).unwrap();

        assert!(decision.triggers.score_drop);
        assert!(decision.triggers.window_full);
        assert_relative_eq!(decision.threshold, 0.475);
        // Rotation order from largest: 5, 4, 2, 3, 1; slot 2 is first above 0.475.
        assert_eq!(decision.pivot, 2);
        assert!(!decision.fallback_pivot);
        let targets: Vec<u64> = decision
            .relations
            .iter()
            .filter_map(|r| r.nodes().1)
            .collect();
        assert_eq!(targets, vec![11, 12, 13]);
    }

    #[test]
    fn test_window_full_forces_keyframe() {
        let scores = KeyframeScores::from_slots(vec![
            slot(1, 0.9, 0.0),
            slot(2, 0.9, 0.0),
            slot(3, 0.9, 0.0),
            slot(4, 0.95, 0.0),
        ]);

        let decision = selector().decide(scores, 0).unwrap();

        assert!(decision.triggers.window_full);
        assert!(!decision.triggers.score_drop);
    }

    #[test]
    fn test_large_first_motion_forces_keyframe() {
        let mut first = slot(1, 0.9, 0.0);
        first.motion_norm = 31.0;
        let scores = KeyframeScores::from_slots(vec![first, slot(2, 0.95, 0.0)]);

        let decision = selector().decide(scores, 0).unwrap();

        assert!(decision.triggers.large_first_motion);
    }

    #[test]
    fn test_all_vetoed_falls_back_to_best() {
        let scores = KeyframeScores::from_slots(vec![
            slot(1, 0.0, 1.0),
            slot(2, 0.0, 2.0),
            slot(3, 0.0, 3.0),
            slot(4, 0.0, 4.0),
        ]);

        let decision = selector().decide(scores, 0).unwrap();

        assert!(decision.fallback_pivot);
        assert_eq!(decision.pivot, 4);
        assert_eq!(decision.relations.len(), 1);
    }

    struct Forward;

    impl TransformEstimator<u64> for Forward {
        fn estimate(&mut self, from: &u64, to: &u64) -> Pose2D {
            Pose2D::new((*to - *from) as f64, 0.0, 0.0)
        }
    }

    #[test]
    fn test_evaluate_caches_deltas() {
        let mut window = FrameWindow::new();
        for id in 0..3u64 {
            let slot = window.append(Timestamped::new(id, id));
            window.assign_node(slot, id);
        }

        let decision = selector().evaluate(&mut window, &mut Forward, 0);

        assert!(decision.is_none());
        assert_eq!(window.keyframe_delta(1), Some(Pose2D::new(1.0, 0.0, 0.0)));
        assert_eq!(window.keyframe_delta(2), Some(Pose2D::new(2.0, 0.0, 0.0)));
    }
}
