//! Odometry relation construction.
//!
//! Anchors the newest frame of the window to an earlier pose node using a
//! coarse-to-fine baseline search: the previous slot first, then two slots
//! back, and so on down to slot 0. The first baseline whose direction score
//! clears `odom_threshold` wins.
//!
//! A negligible translation on the nearest baseline ends the search
//! immediately; a stationary vehicle should not pay for wider baselines.

use serde::{Deserialize, Serialize};

use super::estimator::TransformEstimator;
use super::graph::{DiagonalNoise, Relation};
use super::state::TrajectoryState;
use super::window::FrameWindow;
use crate::config::defaults;
use crate::core::types::Pose2D;

/// Configuration for odometry acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometryFactorConfig {
    /// Translations shorter than this on the nearest baseline are
    /// treated as no motion.
    #[serde(default = "defaults::resol")]
    pub resol: f64,

    /// Minimum direction score for a baseline to be accepted.
    #[serde(default = "defaults::odom_threshold")]
    pub odom_threshold: f64,
}

impl Default for OdometryFactorConfig {
    fn default() -> Self {
        Self {
            resol: defaults::resol(),
            odom_threshold: defaults::odom_threshold(),
        }
    }
}

/// Why the newest frame was removed from the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Nearest-baseline translation below `resol`.
    NegligibleMotion,
    /// No baseline cleared `odom_threshold`.
    LowConfidence,
}

/// An accepted odometry step.
#[derive(Debug, Clone)]
pub struct OdometryAcceptance {
    /// Newly created pose node.
    pub node: u64,
    /// Node the relation is anchored to.
    pub anchor: u64,
    /// Baseline length in slots (1 = previous frame).
    pub baseline: usize,
    /// Raw relative transform from anchor to node.
    pub delta: Pose2D,
    /// Direction score of the accepted baseline.
    pub score: f64,
    /// Composed raw global pose, also the initial guess.
    pub pose: Pose2D,
    /// Between relation to queue for the next solve.
    pub relation: Relation,
}

/// Result of one odometry attempt.
#[derive(Debug, Clone)]
pub enum OdometryOutcome {
    /// The newest frame became a pose node.
    Accepted(OdometryAcceptance),
    /// The newest frame was dropped from the window.
    Dropped(DropReason),
}

/// Builds between relations for newly arrived frames.
#[derive(Debug, Clone)]
pub struct OdometryFactorBuilder {
    config: OdometryFactorConfig,
    noise: DiagonalNoise,
}

impl OdometryFactorBuilder {
    /// Create a builder emitting relations with `noise`.
    pub fn new(config: OdometryFactorConfig, noise: DiagonalNoise) -> Self {
        Self { config, noise }
    }

    /// Get the configuration.
    pub fn config(&self) -> &OdometryFactorConfig {
        &self.config
    }

    /// Try to anchor the newest slot of `window`.
    ///
    /// On acceptance `state` gains exactly one pose node and the slot is
    /// tagged with it. On failure the newest slot is dropped and `state` is
    /// untouched. A window holding only slot 0 has nothing to anchor and is
    /// reported as [`DropReason::LowConfidence`] without modification.
    pub fn build<F, E>(
        &self,
        window: &mut FrameWindow<F>,
        estimator: &mut E,
        state: &mut TrajectoryState,
    ) -> OdometryOutcome
    where
        E: TransformEstimator<F> + ?Sized,
    {
        let num = window.accumulated();
        if num == 0 {
            return OdometryOutcome::Dropped(DropReason::LowConfidence);
        }

        for baseline in 1..=num {
            let begin = num - baseline;
            let (Some(from), Some(to)) = (window.frame(begin), window.frame(num)) else {
                break;
            };
            let delta = estimator.estimate(&from.data, &to.data);
            if !delta.is_finite() {
                log::warn!("Non-finite transform for slot {} -> {}, skipping", begin, num);
                continue;
            }
            let motion = delta.translation_norm();
            let score = delta.direction_score();

            log::debug!(
                "Odometry baseline {} (slot {} -> {}): score {:.4}, motion {:.4}, dθ {:.2}°",
                baseline,
                begin,
                num,
                score,
                motion,
                delta.theta_degrees()
            );

            if baseline == 1 && motion < self.config.resol {
                log::warn!("Negligible motion ({:.4}), dropping newest frame", motion);
                window.drop_last();
                return OdometryOutcome::Dropped(DropReason::NegligibleMotion);
            }

            if score <= self.config.odom_threshold {
                continue;
            }

            let Some(anchor) = window.node(begin) else {
                continue;
            };
            let Some(anchor_pose) = state.raw_pose(anchor) else {
                continue;
            };

            let pose = anchor_pose.compose(&delta);
            let node = state.advance(pose);
            window.assign_node(num, node);
            window.set_odometry_delta(num, delta);

            log::info!(
                "Odometry {} -> {} accepted (baseline {}, score {:.3}): {}",
                anchor,
                node,
                baseline,
                score,
                pose
            );

            return OdometryOutcome::Accepted(OdometryAcceptance {
                node,
                anchor,
                baseline,
                delta,
                score,
                pose,
                relation: Relation::between(anchor, node, delta, self.noise),
            });
        }

        log::warn!("No baseline cleared the odometry threshold, dropping newest frame");
        window.drop_last();
        OdometryOutcome::Dropped(DropReason::LowConfidence)
    }
}
