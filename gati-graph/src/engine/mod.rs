//! Keyframe pose graph engine.
//!
//! # Stages
//!
//! - [`odometry_factor`] - Anchors each new frame to an earlier pose node
//! - [`keyframe`] - Scores the window and promotes keyframes
//! - [`graph`] - Relations, persistent graph and incremental solver
//! - [`backend`] - Wires the stages together per frame
//!
//! # Support
//!
//! - [`window`] - Sliding window of frames since the last keyframe
//! - [`estimator`] - Frame registration trait
//! - [`state`] - Pose counters and raw pose chain
//! - [`publisher`] - Pose event sinks

pub mod backend;
pub mod estimator;
pub mod graph;
pub mod keyframe;
pub mod odometry_factor;
pub mod publisher;
pub mod state;
pub mod window;

pub use backend::{FrameOutcome, Keyframe, KeyframeBackend, KeyframeEvent};
pub use estimator::TransformEstimator;
pub use keyframe::{
    KeyframeDecision, KeyframeScores, KeyframeSelector, KeyframeSelectorConfig, KeyframeTriggers,
    SlotScore,
};
pub use odometry_factor::{
    DropReason, OdometryAcceptance, OdometryFactorBuilder, OdometryFactorConfig, OdometryOutcome,
};
pub use publisher::{ChannelPublisher, LogPublisher, OdometryPublisher, PoseEvent, PoseEventKind};
pub use state::TrajectoryState;
pub use window::{FrameWindow, WindowSlot};
