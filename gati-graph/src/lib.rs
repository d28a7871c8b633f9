//! GatiGraph - Adaptive keyframe pose graph back end
//!
//! Turns a stream of frame-to-frame registration results from a radar or
//! sonar front end into a globally consistent 2D trajectory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      main                           │  ← Simulation CLI
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │                   (simulation)                      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │     (odometry factor, keyframe, graph, backend)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 config/ error                       │  ← Parameters
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! 1. Every frame is appended to a sliding window and anchored to an earlier
//!    pose node by the odometry factor builder, or dropped.
//! 2. The keyframe selector scores the window against the current keyframe
//!    and, when the evidence degrades, promotes a pivot frame and emits
//!    rotation-only relations.
//! 3. Keyframe events run a batched incremental solve and publish the
//!    refined keyframe pose.
//!
//! # Example
//!
//! ```
//! use gati_graph::{GatiConfig, KeyframeBackend, PoseEvent};
//! use gati_graph::io::{SimulatedEstimator, TrajectoryGenerator, TransformNoise};
//!
//! let frames = TrajectoryGenerator::new().forward(8, 1.0).build();
//! let estimator = SimulatedEstimator::new(TransformNoise::none(), 0).unwrap();
//! let mut backend =
//!     KeyframeBackend::new(&GatiConfig::default(), estimator, Vec::<PoseEvent>::new()).unwrap();
//!
//! for frame in frames {
//!     backend.process_frame(frame, frame.timestamp_us()).unwrap();
//! }
//! assert_eq!(backend.state().pose_count(), 8);
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Configuration and errors (depends on core)
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Layer 3: Engine (depends on core, config)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 4: I/O infrastructure (depends on all layers)
// ============================================================================
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{Pose2D, Timestamped};

// Configuration and errors
pub use config::{ConfigError, GatiConfig};
pub use error::{GraphError, Result};

// Engine
pub use engine::graph::{
    DiagonalNoise, EstimateHandle, IncrementalPoseGraphSolver, NoiseConfig, Relation,
    RelationKind, SolveReport,
};
pub use engine::{
    ChannelPublisher, DropReason, FrameOutcome, FrameWindow, KeyframeBackend, KeyframeDecision,
    KeyframeSelector, LogPublisher, OdometryFactorBuilder, OdometryPublisher, PoseEvent,
    PoseEventKind, TrajectoryState, TransformEstimator,
};
