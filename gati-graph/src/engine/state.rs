//! Trajectory bookkeeping shared by the odometry and keyframe stages.

use crate::core::types::Pose2D;

/// Running counters and the raw pose chain.
///
/// Node 0 (the origin) exists from construction; every other node is created
/// by [`advance`](Self::advance).
#[derive(Debug, Clone)]
pub struct TrajectoryState {
    pose_count: u64,
    key_node: u64,
    window_loop: u64,
    raw_poses: Vec<Pose2D>,
    accepted_since_solve: usize,
}

impl Default for TrajectoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryState {
    /// State holding only the origin node.
    pub fn new() -> Self {
        Self {
            pose_count: 0,
            key_node: 0,
            window_loop: 0,
            raw_poses: vec![Pose2D::identity()],
            accepted_since_solve: 0,
        }
    }

    /// Highest pose node created so far.
    #[inline]
    pub fn pose_count(&self) -> u64 {
        self.pose_count
    }

    /// Pose node of the current keyframe.
    #[inline]
    pub fn key_node(&self) -> u64 {
        self.key_node
    }

    /// Frames consumed across all window resets.
    #[inline]
    pub fn window_loop(&self) -> u64 {
        self.window_loop
    }

    /// Odometry acceptances since the last successful solve.
    #[inline]
    pub fn accepted_since_solve(&self) -> usize {
        self.accepted_since_solve
    }

    /// Unoptimized pose of a node.
    pub fn raw_pose(&self, node: u64) -> Option<Pose2D> {
        usize::try_from(node)
            .ok()
            .and_then(|i| self.raw_poses.get(i))
            .copied()
    }

    /// Every raw pose, indexed by node.
    pub fn raw_poses(&self) -> &[Pose2D] {
        &self.raw_poses
    }

    /// Create the next pose node with its raw pose and return its index.
    pub fn advance(&mut self, raw_pose: Pose2D) -> u64 {
        self.pose_count += 1;
        self.raw_poses.push(raw_pose);
        self.accepted_since_solve += 1;
        self.pose_count
    }

    /// Move the keyframe anchor after a window reset of `consumed` frames.
    pub fn reset_keyframe(&mut self, key_node: u64, consumed: usize) {
        self.key_node = key_node;
        self.window_loop += consumed as u64;
    }

    /// Clear the acceptance counter after a successful solve.
    pub fn mark_solved(&mut self) {
        self.accepted_since_solve = 0;
    }
}
