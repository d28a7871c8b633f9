//! Planar rigid pose.

use serde::{Deserialize, Serialize};

use crate::core::math::{direction_score, normalize_angle, to_degrees};

/// Planar pose or relative transform.
///
/// Position (x, y) in the registration's translation unit and heading
/// (theta) in radians, normalized to [-π, π]. The same type carries both
/// global poses and the (Δx, Δy, Δθ) deltas produced by frame registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    /// X position
    pub x: f64,
    /// Y position
    pub y: f64,
    /// Heading in radians, normalized to [-π, π]
    pub theta: f64,
}

impl Pose2D {
    /// Create a new pose with theta normalized to [-π, π].
    #[inline]
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    /// Identity pose at origin with zero heading.
    #[inline]
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            theta: 0.0,
        }
    }

    /// Compose two poses: self ⊕ other
    ///
    /// Applies `other` relative to the frame of `self`.
    /// ```text
    /// C = A ⊕ B:
    ///   C.x = A.x + B.x * cos(A.θ) - B.y * sin(A.θ)
    ///   C.y = A.y + B.x * sin(A.θ) + B.y * cos(A.θ)
    ///   C.θ = normalize(A.θ + B.θ)
    /// ```
    #[inline]
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            self.x + other.x * cos_t - other.y * sin_t,
            self.y + other.x * sin_t + other.y * cos_t,
            self.theta + other.theta,
        )
    }

    /// Inverse of this pose.
    #[inline]
    pub fn inverse(&self) -> Pose2D {
        let (sin_t, cos_t) = self.theta.sin_cos();
        Pose2D::new(
            -self.x * cos_t - self.y * sin_t,
            self.x * sin_t - self.y * cos_t,
            -self.theta,
        )
    }

    /// Relative transform from `self` to `other`: self⁻¹ ⊕ other.
    #[inline]
    pub fn between(&self, other: &Pose2D) -> Pose2D {
        self.inverse().compose(other)
    }

    /// Translation magnitude sqrt(x² + y²).
    #[inline]
    pub fn translation_norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Heading in degrees.
    #[inline]
    pub fn theta_degrees(&self) -> f64 {
        to_degrees(self.theta)
    }

    /// Agreement between travel direction and heading change, in (0, 1].
    #[inline]
    pub fn direction_score(&self) -> f64 {
        direction_score(self.x, self.y, self.theta)
    }

    /// True if every component is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

impl Default for Pose2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Pose2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.2}°)",
            self.x,
            self.y,
            self.theta_degrees()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_pose_compose_identity() {
        let p = Pose2D::new(1.0, 2.0, 0.5);
        let result = p.compose(&Pose2D::identity());
        assert_relative_eq!(result.x, p.x);
        assert_relative_eq!(result.y, p.y);
        assert_relative_eq!(result.theta, p.theta);
    }

    #[test]
    fn test_pose_inverse_roundtrip() {
        let p = Pose2D::new(1.0, 2.0, 0.5);
        let result = p.compose(&p.inverse());
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.theta, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_composition_order() {
        let move_forward = Pose2D::new(1.0, 0.0, 0.0);
        let rotate = Pose2D::new(0.0, 0.0, FRAC_PI_2);

        let result = move_forward.compose(&rotate);
        assert_relative_eq!(result.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.theta, FRAC_PI_2, epsilon = 1e-12);

        let result = rotate.compose(&move_forward);
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_between_recovers_delta() {
        let a = Pose2D::new(2.0, -1.0, 0.3);
        let delta = Pose2D::new(0.7, 0.2, -0.1);
        let b = a.compose(&delta);

        let recovered = a.between(&b);
        assert_relative_eq!(recovered.x, delta.x, epsilon = 1e-12);
        assert_relative_eq!(recovered.y, delta.y, epsilon = 1e-12);
        assert_relative_eq!(recovered.theta, delta.theta, epsilon = 1e-12);
    }

    #[test]
    fn test_translation_norm() {
        assert_relative_eq!(Pose2D::new(3.0, 4.0, 1.0).translation_norm(), 5.0);
    }

    #[test]
    fn test_theta_normalized_on_construction() {
        let p = Pose2D::new(0.0, 0.0, 3.0 * std::f64::consts::PI);
        assert!(p.theta.abs() <= std::f64::consts::PI + 1e-12);
    }
}
