//! Pose graph storage and incremental optimization.
//!
//! - [`relation`] - Prior, between and rotation-only relations with noise models
//! - [`pose_graph`] - Persistent node and relation storage
//! - [`optimizer`] - Levenberg-Marquardt over a subset of free nodes
//! - [`solver`] - Batched incremental solving with atomic commits

pub mod optimizer;
pub mod pose_graph;
pub mod relation;
pub mod solver;

pub use optimizer::{GraphOptimizer, GraphOptimizerConfig, OptimizationResult, TerminationReason};
pub use pose_graph::{Checkpoint, PoseGraph, PoseNode};
pub use relation::{DiagonalNoise, NoiseConfig, Relation, RelationKind};
pub use solver::{EstimateHandle, EstimateSnapshot, IncrementalPoseGraphSolver, SolveReport};
