//! Error types for the keyframe back end.

use thiserror::Error;

use crate::config::ConfigError;

/// Back end error type.
///
/// Frame drops and pivot fallbacks are ordinary outcomes and never appear
/// here; only failures that would corrupt the published trajectory do.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The incremental solve failed to produce a consistent estimate.
    ///
    /// Nothing from the failed solve is visible through
    /// [`estimate`](crate::engine::graph::IncrementalPoseGraphSolver::estimate).
    #[error("solver diverged after {iterations} iterations: {reason}")]
    SolverDivergence {
        /// What stopped the solve.
        reason: String,
        /// Iterations completed before giving up.
        iterations: u32,
    },

    /// A node was queried that no solve has produced yet.
    #[error("no estimate for pose node {0}")]
    UnknownNode(u64),

    /// A relation references a node that has neither an estimate nor an
    /// initial guess.
    #[error("relation {from} -> {to} references a node without an initial guess")]
    InvalidRelation {
        /// Source node.
        from: u64,
        /// Target node.
        to: u64,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
