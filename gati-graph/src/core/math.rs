//! Mathematical primitives for planar pose estimation.
//!
//! Headings are radians in `f64`; registration deltas are small enough that
//! single precision loses the rotation-only residuals after a few hundred
//! keyframes.

use std::f64::consts::PI;

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use gati_graph::core::math::normalize_angle;
/// use std::f64::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-9);
/// assert!((normalize_angle(-3.0 * PI) - (-PI)).abs() < 1e-9);
/// ```
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest signed angular difference from `a` to `b`.
#[inline]
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(b - a)
}

/// Radians to degrees.
#[inline]
pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

/// Directional agreement between a translation and a heading change.
///
/// `exp(-|atan2(dy, dx) + dθ|)`: 1.0 when the travel direction cancels the
/// heading change, decaying towards 0 as they disagree. Used by both the
/// odometry acceptance test and keyframe scoring.
#[inline]
pub fn direction_score(dx: f64, dy: f64, dtheta: f64) -> f64 {
    (-(dy.atan2(dx) + dtheta).abs()).exp()
}
