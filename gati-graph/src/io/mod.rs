//! I/O and infrastructure layer.
//!
//! # Contents
//!
//! - [`simulation`]: Synthetic trajectories and a noisy registration stand-in

pub mod simulation;

pub use simulation::{SimulatedEstimator, SimulatedFrame, TransformNoise, TrajectoryGenerator};
