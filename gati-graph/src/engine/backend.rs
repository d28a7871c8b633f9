//! Per-frame driver for the keyframe pose graph.
//!
//! Each frame runs to completion before the next one is accepted:
//!
//! ```text
//! frame ─► window.append ─► OdometryFactorBuilder ──drop──► Dropped
//!                                   │ accept
//!                                   ▼
//!                         raw pose published, relation queued
//!                                   │
//!                                   ▼
//!                           KeyframeSelector ──none──► Accepted
//!                                   │ keyframe
//!                                   ▼
//!             rotation relations queued, solve if enough new material,
//!             optimized pose published, window reset to the pivot
//! ```

use super::estimator::TransformEstimator;
use super::graph::{EstimateHandle, IncrementalPoseGraphSolver, Relation, SolveReport};
use super::keyframe::{KeyframeDecision, KeyframeSelector};
use super::odometry_factor::{DropReason, OdometryFactorBuilder, OdometryOutcome};
use super::publisher::{OdometryPublisher, PoseEvent, PoseEventKind};
use super::state::TrajectoryState;
use super::window::FrameWindow;
use crate::config::GatiConfig;
use crate::core::types::{Pose2D, Timestamped};
use crate::error::Result;

/// A frame promoted to keyframe.
#[derive(Debug, Clone)]
pub struct Keyframe<F> {
    /// Pose node of the keyframe.
    pub node: u64,
    /// The frame itself.
    pub frame: Timestamped<F>,
}

/// Summary of a keyframe event.
#[derive(Debug, Clone)]
pub struct KeyframeEvent {
    /// Keyframe node before the event.
    pub previous_node: u64,
    /// New keyframe node.
    pub pivot_node: u64,
    /// True if the pivot came from the best-score fallback.
    pub fallback_pivot: bool,
    /// Rotation-only relations queued.
    pub relations: usize,
    /// Report of the solve, if one ran.
    pub solve: Option<SolveReport>,
}

/// What happened to a frame.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// First frame; it became node 0.
    Initialized,
    /// The frame was removed from the window.
    Dropped(DropReason),
    /// The frame became a pose node.
    Accepted {
        /// New pose node.
        node: u64,
        /// Keyframe event triggered by this frame.
        keyframe: Option<KeyframeEvent>,
    },
}

impl FrameOutcome {
    /// Pose node created by this frame, if any.
    pub fn node(&self) -> Option<u64> {
        match self {
            FrameOutcome::Initialized => Some(0),
            FrameOutcome::Dropped(_) => None,
            FrameOutcome::Accepted { node, .. } => Some(*node),
        }
    }

    /// Keyframe event triggered by this frame, if any.
    pub fn keyframe(&self) -> Option<&KeyframeEvent> {
        match self {
            FrameOutcome::Accepted { keyframe, .. } => keyframe.as_ref(),
            _ => None,
        }
    }
}

/// Keyframe pose graph back end.
///
/// Generic over the frame payload `F`, the registration routine `E` and the
/// pose sink `P`.
pub struct KeyframeBackend<F, E, P> {
    window: FrameWindow<F>,
    estimator: E,
    publisher: P,
    state: TrajectoryState,
    odometry: OdometryFactorBuilder,
    selector: KeyframeSelector,
    solver: IncrementalPoseGraphSolver,
    keyframes: Vec<Keyframe<F>>,
    min_accepted_per_solve: usize,
}

impl<F, E, P> KeyframeBackend<F, E, P>
where
    F: Clone,
    E: TransformEstimator<F>,
    P: OdometryPublisher,
{
    /// Validate `config` and create a back end holding only the origin prior.
    pub fn new(config: &GatiConfig, estimator: E, publisher: P) -> Result<Self> {
        config.validate()?;

        let mut solver = IncrementalPoseGraphSolver::new(config.solver.clone());
        solver.add_relation(Relation::prior(
            0,
            Pose2D::identity(),
            config.noise.prior_noise(),
        ));
        solver.add_initial_guess(0, Pose2D::identity());

        Ok(Self {
            window: FrameWindow::new(),
            estimator,
            publisher,
            state: TrajectoryState::new(),
            odometry: OdometryFactorBuilder::new(
                config.odometry.clone(),
                config.noise.odometry_noise(),
            ),
            selector: KeyframeSelector::new(config.keyframe.clone(), config.noise.rotation),
            solver,
            keyframes: Vec::new(),
            min_accepted_per_solve: config.keyframe.min_accepted_per_solve,
        })
    }

    /// Process one frame to completion.
    ///
    /// Errors only on solver failure, in which case the solved estimates are
    /// unchanged and the current trajectory segment should be abandoned.
    pub fn process_frame(&mut self, frame: F, timestamp_us: u64) -> Result<FrameOutcome> {
        let frame = Timestamped::new(frame, timestamp_us);

        if self.window.is_empty() {
            self.keyframes.push(Keyframe {
                node: 0,
                frame: frame.clone(),
            });
            let slot = self.window.append(frame);
            self.window.assign_node(slot, 0);
            log::info!("Initialized at origin with first frame @ {}us", timestamp_us);
            return Ok(FrameOutcome::Initialized);
        }

        self.window.append(frame);
        let accepted = match self
            .odometry
            .build(&mut self.window, &mut self.estimator, &mut self.state)
        {
            OdometryOutcome::Accepted(accepted) => accepted,
            OdometryOutcome::Dropped(reason) => return Ok(FrameOutcome::Dropped(reason)),
        };

        self.solver.add_relation(accepted.relation);
        self.solver.add_initial_guess(accepted.node, accepted.pose);
        self.publisher.publish(PoseEvent {
            node: accepted.node,
            pose: accepted.pose,
            kind: PoseEventKind::Raw,
            timestamp_us,
        });

        let keyframe = match self.selector.evaluate(
            &mut self.window,
            &mut self.estimator,
            self.state.key_node(),
        ) {
            Some(decision) => Some(self.apply_keyframe(decision, timestamp_us)?),
            None => None,
        };

        Ok(FrameOutcome::Accepted {
            node: accepted.node,
            keyframe,
        })
    }

    fn apply_keyframe(
        &mut self,
        decision: KeyframeDecision,
        timestamp_us: u64,
    ) -> Result<KeyframeEvent> {
        let previous_node = self.state.key_node();
        let relations = decision.relations.len();
        for relation in decision.relations {
            self.solver.add_relation(relation);
        }

        let solve = if self.state.accepted_since_solve() >= self.min_accepted_per_solve {
            let report = self.solver.solve()?;
            self.state.mark_solved();
            let pose = self.solver.require_estimate(previous_node)?;
            self.publisher.publish(PoseEvent {
                node: previous_node,
                pose,
                kind: PoseEventKind::Optimized,
                timestamp_us,
            });
            Some(report)
        } else {
            log::debug!(
                "Keyframe solve deferred ({} of {} acceptances)",
                self.state.accepted_since_solve(),
                self.min_accepted_per_solve
            );
            None
        };

        let consumed = self.window.len();
        if let Some(kept) = self.window.reset_to(decision.pivot) {
            self.keyframes.push(Keyframe {
                node: decision.pivot_node,
                frame: kept.frame.clone(),
            });
        }
        self.state.reset_keyframe(decision.pivot_node, consumed);

        Ok(KeyframeEvent {
            previous_node,
            pivot_node: decision.pivot_node,
            fallback_pivot: decision.fallback_pivot,
            relations,
            solve,
        })
    }

    /// Solved estimate of a node.
    pub fn estimate(&self, node: u64) -> Option<Pose2D> {
        self.solver.estimate(node)
    }

    /// Solved estimate if available, otherwise the raw pose.
    pub fn best_pose(&self, node: u64) -> Option<Pose2D> {
        self.estimate(node).or_else(|| self.state.raw_pose(node))
    }

    /// Best pose of every node created so far, indexed by node.
    pub fn trajectory(&self) -> Vec<Pose2D> {
        (0..=self.state.pose_count())
            .filter_map(|node| self.best_pose(node))
            .collect()
    }

    /// Handle for reading solved estimates from another thread.
    pub fn handle(&self) -> EstimateHandle {
        self.solver.handle()
    }

    /// Trajectory counters and raw poses.
    pub fn state(&self) -> &TrajectoryState {
        &self.state
    }

    /// Current sliding window.
    pub fn window(&self) -> &FrameWindow<F> {
        &self.window
    }

    /// The incremental solver.
    pub fn solver(&self) -> &IncrementalPoseGraphSolver {
        &self.solver
    }

    /// Every frame promoted to keyframe, starting with the first frame.
    pub fn keyframes(&self) -> &[Keyframe<F>] {
        &self.keyframes
    }

    /// The pose sink.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Mutable access to the pose sink.
    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    /// Consume the back end, returning the pose sink.
    pub fn into_publisher(self) -> P {
        self.publisher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    /// Frames are x positions on a straight line.
    struct Line;

    impl TransformEstimator<f64> for Line {
        fn estimate(&mut self, from: &f64, to: &f64) -> Pose2D {
            Pose2D::new(to - from, 0.0, 0.0)
        }
    }

    fn backend() -> KeyframeBackend<f64, Line, Vec<PoseEvent>> {
        KeyframeBackend::new(&GatiConfig::default(), Line, Vec::new()).unwrap()
    }

    #[test]
    fn test_first_frame_initializes() {
        let mut backend = backend();

        let outcome = backend.process_frame(0.0, 0).unwrap();

        assert!(matches!(outcome, FrameOutcome::Initialized));
        assert_eq!(backend.window().len(), 1);
        assert_eq!(backend.keyframes().len(), 1);
        assert!(backend.publisher().is_empty());
        assert_eq!(backend.solver().pending_relations().len(), 1);
    }

    #[test]
    fn test_accepted_frame_publishes_raw_pose() {
        let mut backend = backend();
        backend.process_frame(0.0, 0).unwrap();

        let outcome = backend.process_frame(1.0, 100).unwrap();

        assert_eq!(outcome.node(), Some(1));
        assert_eq!(backend.publisher().len(), 1);
        assert_eq!(backend.publisher()[0].kind, PoseEventKind::Raw);
        assert_eq!(backend.publisher()[0].timestamp_us, 100);
        assert_eq!(backend.best_pose(1), Some(Pose2D::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_stationary_frame_is_dropped() {
        let mut backend = backend();
        backend.process_frame(0.0, 0).unwrap();

        let outcome = backend.process_frame(0.001, 100).unwrap();

        assert!(matches!(
            outcome,
            FrameOutcome::Dropped(DropReason::NegligibleMotion)
        ));
        assert_eq!(backend.window().len(), 1);
        assert_eq!(backend.state().pose_count(), 0);
    }

    #[test]
    fn test_forced_keyframe_solves_and_resets() {
        let mut backend = backend();
        backend.process_frame(0.0, 0).unwrap();
        for i in 1..=3 {
            let outcome = backend.process_frame(i as f64, i * 100).unwrap();
            assert!(outcome.keyframe().is_none());
        }

        let outcome = backend.process_frame(4.0, 400).unwrap();
        let event = outcome.keyframe().unwrap();

        assert_eq!(event.previous_node, 0);
        assert!(event.solve.is_some());
        assert_eq!(backend.window().len(), 1);
        assert_eq!(backend.state().key_node(), event.pivot_node);
        assert_eq!(backend.state().window_loop(), 5);
        assert_eq!(backend.keyframes().len(), 2);
        assert!(backend.solver().pending_relations().is_empty());

        let optimized = backend.publisher().last().unwrap();
        assert_eq!(optimized.kind, PoseEventKind::Optimized);
        assert_eq!(optimized.node, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = GatiConfig::default();
        config.keyframe.keyframe_threshold = 0.0;

        let result = KeyframeBackend::new(&config, Line, Vec::new());

        assert!(matches!(result, Err(GraphError::Config(_))));
    }
}
