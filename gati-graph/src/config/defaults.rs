//! Default value functions for serde deserialization.
//!
//! Values match the tuning of the radar odometry node this back end was
//! built for.

pub fn resol() -> f64 {
    0.01
}

pub fn odom_threshold() -> f64 {
    0.3
}

pub fn keyframe_threshold() -> f64 {
    0.5
}

pub fn veto_min_motion() -> f64 {
    1.0
}

pub fn max_lateral() -> f64 {
    2.0
}

pub fn max_rotation_deg() -> f64 {
    90.0
}

pub fn max_accumulated_frames() -> usize {
    3
}

pub fn large_first_motion() -> f64 {
    30.0
}

pub fn min_accepted_per_solve() -> usize {
    2
}

pub fn prior_sigmas() -> [f64; 3] {
    [0.01, 0.01, 0.001]
}

pub fn odometry_sigmas() -> [f64; 3] {
    [1.0, 1.0, 0.1]
}

pub fn keyframe_sigmas() -> [f64; 3] {
    [1.0, 1.0, 1e-3]
}

pub fn rotation_sigma() -> f64 {
    1e-2
}

pub fn max_iterations() -> u32 {
    100
}

pub fn convergence_threshold() -> f64 {
    1e-6
}

pub fn initial_damping() -> f64 {
    1e-3
}

pub fn max_damping() -> f64 {
    1e10
}
