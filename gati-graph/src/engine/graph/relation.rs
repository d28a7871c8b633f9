//! Graph relations (factors) and their noise models.

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::core::types::Pose2D;

/// Diagonal noise model given as standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagonalNoise {
    /// Standard deviation along x
    pub sigma_x: f64,
    /// Standard deviation along y
    pub sigma_y: f64,
    /// Standard deviation of heading (radians)
    pub sigma_theta: f64,
}

impl DiagonalNoise {
    /// Create from standard deviations.
    pub fn new(sigma_x: f64, sigma_y: f64, sigma_theta: f64) -> Self {
        Self {
            sigma_x,
            sigma_y,
            sigma_theta,
        }
    }

    /// Create from an `[x, y, theta]` sigma array.
    pub fn from_sigmas(sigmas: [f64; 3]) -> Self {
        Self::new(sigmas[0], sigmas[1], sigmas[2])
    }

    /// Diagonal of the information matrix (1/σ²).
    pub fn information(&self) -> [f64; 3] {
        [
            1.0 / (self.sigma_x * self.sigma_x),
            1.0 / (self.sigma_y * self.sigma_y),
            1.0 / (self.sigma_theta * self.sigma_theta),
        ]
    }
}

/// Noise sigmas for each relation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Prior on node 0, `[x, y, theta]`
    #[serde(default = "defaults::prior_sigmas")]
    pub prior: [f64; 3],

    /// Odometry between-relations, `[x, y, theta]`
    #[serde(default = "defaults::odometry_sigmas")]
    pub odometry: [f64; 3],

    /// Keyframe between-relations, `[x, y, theta]`.
    ///
    /// Loaded and validated with the others; keyframe events currently emit
    /// rotation-only relations, which use [`rotation`](Self::rotation).
    #[serde(default = "defaults::keyframe_sigmas")]
    pub keyframe: [f64; 3],

    /// Rotation-only relations (radians)
    #[serde(default = "defaults::rotation_sigma")]
    pub rotation: f64,
}

impl NoiseConfig {
    /// Prior noise model.
    pub fn prior_noise(&self) -> DiagonalNoise {
        DiagonalNoise::from_sigmas(self.prior)
    }

    /// Odometry noise model.
    pub fn odometry_noise(&self) -> DiagonalNoise {
        DiagonalNoise::from_sigmas(self.odometry)
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            prior: defaults::prior_sigmas(),
            odometry: defaults::odometry_sigmas(),
            keyframe: defaults::keyframe_sigmas(),
            rotation: defaults::rotation_sigma(),
        }
    }
}

/// Kind of relation, for statistics and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Absolute pose anchor.
    Prior,
    /// Full relative pose.
    Between,
    /// Relative heading only.
    RotationOnly,
}

/// A write-once constraint on one or two pose nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    /// Absolute pose of a single node.
    Prior {
        node: u64,
        pose: Pose2D,
        noise: DiagonalNoise,
    },

    /// Relative pose `from⁻¹ ⊕ to`.
    Between {
        from: u64,
        to: u64,
        delta: Pose2D,
        noise: DiagonalNoise,
    },

    /// Relative heading `to.θ − from.θ`.
    RotationOnly {
        from: u64,
        to: u64,
        delta_theta: f64,
        sigma: f64,
    },
}

impl Relation {
    /// Prior relation.
    pub fn prior(node: u64, pose: Pose2D, noise: DiagonalNoise) -> Self {
        Relation::Prior { node, pose, noise }
    }

    /// Between relation.
    pub fn between(from: u64, to: u64, delta: Pose2D, noise: DiagonalNoise) -> Self {
        Relation::Between {
            from,
            to,
            delta,
            noise,
        }
    }

    /// Rotation-only relation.
    pub fn rotation_only(from: u64, to: u64, delta_theta: f64, sigma: f64) -> Self {
        Relation::RotationOnly {
            from,
            to,
            delta_theta,
            sigma,
        }
    }

    /// Relation kind.
    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::Prior { .. } => RelationKind::Prior,
            Relation::Between { .. } => RelationKind::Between,
            Relation::RotationOnly { .. } => RelationKind::RotationOnly,
        }
    }

    /// Nodes constrained by this relation.
    pub fn nodes(&self) -> (u64, Option<u64>) {
        match *self {
            Relation::Prior { node, .. } => (node, None),
            Relation::Between { from, to, .. } | Relation::RotationOnly { from, to, .. } => {
                (from, Some(to))
            }
        }
    }

    /// Lowest node index touched.
    pub fn min_node(&self) -> u64 {
        match self.nodes() {
            (a, Some(b)) => a.min(b),
            (a, None) => a,
        }
    }
}
