//! Core foundation layer.
//!
//! Bottom layer of the back end with no internal dependencies.
//!
//! # Contents
//!
//! - [`types`]: Pose and timestamp types
//! - [`math`]: Angle normalization and unit conversion

pub mod math;
pub mod types;
