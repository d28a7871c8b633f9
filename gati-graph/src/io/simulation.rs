//! Synthetic trajectories for exercising the back end without a sensor.
//!
//! Frames carry their ground-truth pose; [`SimulatedEstimator`] plays the
//! registration routine by returning the true relative transform plus
//! Gaussian noise. Noise is seeded per frame pair, so asking for the same
//! pair twice gives the same answer.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::math::normalize_angle;
use crate::core::types::Pose2D;
use crate::engine::estimator::TransformEstimator;

/// Frame period of the simulated sensor (4 Hz).
pub const FRAME_PERIOD_US: u64 = 250_000;

/// A simulated sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedFrame {
    /// Sequence number.
    pub id: u64,
    /// Ground-truth global pose.
    pub truth: Pose2D,
}

impl SimulatedFrame {
    /// Timestamp of this frame at [`FRAME_PERIOD_US`].
    pub fn timestamp_us(&self) -> u64 {
        self.id * FRAME_PERIOD_US
    }
}

/// Standard deviations of registration noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformNoise {
    /// Per-axis translation noise
    pub translation_sigma: f64,
    /// Heading noise (radians)
    pub rotation_sigma: f64,
}

impl Default for TransformNoise {
    fn default() -> Self {
        Self {
            translation_sigma: 0.05,
            rotation_sigma: 0.005,
        }
    }
}

impl TransformNoise {
    /// Noise-free registration.
    pub fn none() -> Self {
        Self {
            translation_sigma: 0.0,
            rotation_sigma: 0.0,
        }
    }
}

/// Noisy ground-truth registration.
#[derive(Debug, Clone)]
pub struct SimulatedEstimator {
    translation: Normal<f64>,
    rotation: Normal<f64>,
    seed: u64,
    calls: u64,
}

impl SimulatedEstimator {
    /// Create an estimator; fails if a sigma is negative or not finite.
    pub fn new(noise: TransformNoise, seed: u64) -> Result<Self, ConfigError> {
        let normal = |field: &'static str, sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| ConfigError::Invalid {
                field,
                reason: e.to_string(),
            })
        };
        Ok(Self {
            translation: normal("simulation.translation_sigma", noise.translation_sigma)?,
            rotation: normal("simulation.rotation_sigma", noise.rotation_sigma)?,
            seed,
            calls: 0,
        })
    }

    /// Number of registrations performed.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn pair_rng(&self, from: u64, to: u64) -> StdRng {
        let mixed = self
            .seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(from.rotate_left(32) ^ to);
        StdRng::seed_from_u64(mixed)
    }
}

impl TransformEstimator<SimulatedFrame> for SimulatedEstimator {
    fn estimate(&mut self, from: &SimulatedFrame, to: &SimulatedFrame) -> Pose2D {
        self.calls += 1;
        let truth = from.truth.between(&to.truth);
        let mut rng = self.pair_rng(from.id, to.id);
        Pose2D::new(
            truth.x + rng.sample(self.translation),
            truth.y + rng.sample(self.translation),
            truth.theta + rng.sample(self.rotation),
        )
    }
}

/// Builds ground-truth frame sequences.
#[derive(Debug, Clone)]
pub struct TrajectoryGenerator {
    frames: Vec<SimulatedFrame>,
    pose: Pose2D,
}

impl Default for TrajectoryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryGenerator {
    /// Start at the origin with one frame.
    pub fn new() -> Self {
        let mut generator = Self {
            frames: Vec::new(),
            pose: Pose2D::identity(),
        };
        generator.push();
        generator
    }

    fn push(&mut self) {
        let id = self.frames.len() as u64;
        self.frames.push(SimulatedFrame {
            id,
            truth: self.pose,
        });
    }

    /// Add `count` frames, each advancing by `step` in the body frame.
    pub fn steps(mut self, count: usize, step: Pose2D) -> Self {
        for _ in 0..count {
            self.pose = self.pose.compose(&step);
            self.push();
        }
        self
    }

    /// Add `count` frames moving `distance` forward each.
    pub fn forward(self, count: usize, distance: f64) -> Self {
        self.steps(count, Pose2D::new(distance, 0.0, 0.0))
    }

    /// Add `count` frames along an arc turning `turn` radians per frame.
    pub fn arc(self, count: usize, distance: f64, turn: f64) -> Self {
        self.steps(count, Pose2D::new(distance, 0.0, turn))
    }

    /// Add `count` frames that do not move.
    pub fn stationary(self, count: usize) -> Self {
        self.steps(count, Pose2D::identity())
    }

    /// Add `count` frames of forward motion with random heading changes up
    /// to `max_turn` and occasional stops.
    pub fn random_walk(mut self, count: usize, distance: f64, max_turn: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..count {
            let step = if rng.random::<f64>() < 0.1 {
                Pose2D::identity()
            } else {
                let scale = 0.5 + rng.random::<f64>();
                let turn = (rng.random::<f64>() * 2.0 - 1.0) * max_turn;
                Pose2D::new(distance * scale, 0.0, normalize_angle(turn))
            };
            self.pose = self.pose.compose(&step);
            self.push();
        }
        self
    }

    /// The generated frames.
    pub fn build(self) -> Vec<SimulatedFrame> {
        self.frames
    }
}
