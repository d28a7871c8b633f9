//! Incremental pose graph solver.
//!
//! Relations and initial guesses are queued in a pending batch by
//! [`add_batch`](IncrementalPoseGraphSolver::add_batch) and only reach the
//! persistent graph when [`solve`](IncrementalPoseGraphSolver::solve) runs.
//!
//! Each solve re-optimizes the nodes from the oldest one the batch touches
//! up to the newest, holding everything older at its previous estimate.
//! Relations in this back end only ever reach back to the current keyframe
//! (or a few frames before it), so the active set stays bounded while the
//! trajectory grows.
//!
//! A solve is atomic: on failure the persistent graph is rolled back and the
//! published estimates are untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::optimizer::{GraphOptimizer, GraphOptimizerConfig, TerminationReason};
use super::pose_graph::{PoseGraph, PoseNode};
use super::relation::{Relation, RelationKind};
use crate::core::types::Pose2D;
use crate::error::{GraphError, Result};

/// Estimates published by one successful solve.
#[derive(Debug, Clone, Default)]
pub struct EstimateSnapshot {
    /// Number of successful solves so far (0 before the first).
    pub solve_count: u64,
    /// Best pose of every solved node.
    pub poses: BTreeMap<u64, Pose2D>,
}

/// Read-only view of the latest solve, shareable across threads.
///
/// Readers always see either all effects of a solve or none of them.
#[derive(Debug, Clone, Default)]
pub struct EstimateHandle {
    inner: Arc<RwLock<Arc<EstimateSnapshot>>>,
}

impl EstimateHandle {
    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<EstimateSnapshot> {
        Arc::clone(&self.inner.read())
    }

    /// Latest estimate of a node.
    pub fn get(&self, node: u64) -> Option<Pose2D> {
        self.inner.read().poses.get(&node).copied()
    }

    fn publish(&self, snapshot: EstimateSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }
}

/// Summary of a completed solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Relations consumed from the pending batch.
    pub relations_added: usize,
    /// New nodes inserted from initial guesses.
    pub nodes_added: usize,
    /// Nodes re-optimized.
    pub free_nodes: usize,
    /// Optimizer iterations.
    pub iterations: u32,
    /// Chi-squared before optimization.
    pub initial_error: f64,
    /// Chi-squared after optimization.
    pub final_error: f64,
    /// Why the optimizer stopped.
    pub termination_reason: TerminationReason,
}

/// Persistent pose graph plus the batch waiting to be solved.
pub struct IncrementalPoseGraphSolver {
    graph: PoseGraph,
    optimizer: GraphOptimizer,
    pending_relations: Vec<Relation>,
    pending_guesses: BTreeMap<u64, Pose2D>,
    handle: EstimateHandle,
    solve_count: u64,
}

impl IncrementalPoseGraphSolver {
    /// Create an empty solver.
    pub fn new(config: GraphOptimizerConfig) -> Self {
        Self {
            graph: PoseGraph::new(),
            optimizer: GraphOptimizer::new(config),
            pending_relations: Vec::new(),
            pending_guesses: BTreeMap::new(),
            handle: EstimateHandle::default(),
            solve_count: 0,
        }
    }

    /// Queue relations and initial guesses. No solve happens here.
    pub fn add_batch<R, G>(&mut self, relations: R, initial_guesses: G)
    where
        R: IntoIterator<Item = Relation>,
        G: IntoIterator<Item = (u64, Pose2D)>,
    {
        self.pending_relations.extend(relations);
        for (node, pose) in initial_guesses {
            self.pending_guesses.insert(node, pose);
        }
    }

    /// Queue a single relation.
    pub fn add_relation(&mut self, relation: Relation) {
        self.pending_relations.push(relation);
    }

    /// Queue a single initial guess.
    pub fn add_initial_guess(&mut self, node: u64, pose: Pose2D) {
        self.pending_guesses.insert(node, pose);
    }

    /// Fold the pending batch into the graph and re-optimize.
    ///
    /// On success the batch is cleared and the new estimates are published.
    /// On failure the graph and published estimates are unchanged and the
    /// batch is kept for inspection (see [`discard_pending`](Self::discard_pending)).
    pub fn solve(&mut self) -> Result<SolveReport> {
        if self.pending_relations.is_empty() && self.pending_guesses.is_empty() {
            return Ok(SolveReport {
                relations_added: 0,
                nodes_added: 0,
                free_nodes: 0,
                iterations: 0,
                initial_error: 0.0,
                final_error: 0.0,
                termination_reason: TerminationReason::NoRelations,
            });
        }

        let checkpoint = self.graph.checkpoint();
        match self.try_solve() {
            Ok(report) => {
                self.pending_relations.clear();
                self.pending_guesses.clear();
                self.solve_count += 1;
                self.handle.publish(EstimateSnapshot {
                    solve_count: self.solve_count,
                    poses: self.graph.nodes().iter().map(|n| (n.id, n.pose)).collect(),
                });
                log::info!(
                    "Solve #{}: +{} relations, +{} nodes, {} free, {} iters, chi2 {:.4} -> {:.4}",
                    self.solve_count,
                    report.relations_added,
                    report.nodes_added,
                    report.free_nodes,
                    report.iterations,
                    report.initial_error,
                    report.final_error
                );
                Ok(report)
            }
            Err(e) => {
                self.graph.rollback(checkpoint);
                log::error!("Solve failed, graph rolled back: {}", e);
                Err(e)
            }
        }
    }

    fn try_solve(&mut self) -> Result<SolveReport> {
        let mut nodes_added = 0;
        for (&id, &pose) in &self.pending_guesses {
            if self.graph.add_node(PoseNode::new(id, pose)) {
                nodes_added += 1;
            } else {
                log::debug!("Ignoring initial guess for already solved node {}", id);
            }
        }

        let mut oldest = u64::MAX;
        for relation in &self.pending_relations {
            let (a, b) = relation.nodes();
            if !self.graph.contains(a) || b.is_some_and(|b| !self.graph.contains(b)) {
                return Err(GraphError::InvalidRelation {
                    from: a,
                    to: b.unwrap_or(a),
                });
            }
            oldest = oldest.min(relation.min_node());
        }
        if let Some(&first_new) = self.pending_guesses.keys().next() {
            oldest = oldest.min(first_new);
        }

        for relation in &self.pending_relations {
            self.graph.add_relation(relation.clone());
        }

        let free: Vec<u64> = self
            .graph
            .nodes()
            .iter()
            .map(|n| n.id)
            .filter(|&id| id >= oldest)
            .collect();

        let result = self.optimizer.optimize(&self.graph, &free)?;
        match result.termination_reason {
            TerminationReason::MaxIterations => log::warn!(
                "Solve hit iteration cap ({}), chi2 {:.4}",
                result.iterations,
                result.final_error
            ),
            TerminationReason::Stalled => log::debug!(
                "Solve stalled at chi2 {:.4} after {} iterations",
                result.final_error,
                result.iterations
            ),
            _ => {}
        }

        for &(id, pose) in &result.poses {
            self.graph.set_pose(id, pose);
        }

        Ok(SolveReport {
            relations_added: self.pending_relations.len(),
            nodes_added,
            free_nodes: free.len(),
            iterations: result.iterations,
            initial_error: result.initial_error,
            final_error: result.final_error,
            termination_reason: result.termination_reason,
        })
    }

    /// Best pose for a node; `None` until a solve has included it.
    pub fn estimate(&self, node: u64) -> Option<Pose2D> {
        self.graph.pose(node)
    }

    /// Like [`estimate`](Self::estimate) but as an error for unknown nodes.
    pub fn require_estimate(&self, node: u64) -> Result<Pose2D> {
        self.estimate(node).ok_or(GraphError::UnknownNode(node))
    }

    /// Handle for reading estimates from other threads.
    pub fn handle(&self) -> EstimateHandle {
        self.handle.clone()
    }

    /// Drop the pending batch without solving.
    pub fn discard_pending(&mut self) {
        self.pending_relations.clear();
        self.pending_guesses.clear();
    }

    /// Relations waiting for the next solve.
    pub fn pending_relations(&self) -> &[Relation] {
        &self.pending_relations
    }

    /// Initial guesses waiting for the next solve.
    pub fn pending_guesses(&self) -> &BTreeMap<u64, Pose2D> {
        &self.pending_guesses
    }

    /// Number of successful solves.
    pub fn solve_count(&self) -> u64 {
        self.solve_count
    }

    /// The persistent (solved) graph.
    pub fn graph(&self) -> &PoseGraph {
        &self.graph
    }

    /// Number of solved relations of a kind.
    pub fn count_kind(&self, kind: RelationKind) -> usize {
        self.graph.count_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::relation::DiagonalNoise;
    use approx::assert_relative_eq;

    fn solver_with_prior() -> IncrementalPoseGraphSolver {
        let mut solver = IncrementalPoseGraphSolver::new(GraphOptimizerConfig::default());
        solver.add_batch(
            [Relation::prior(
                0,
                Pose2D::identity(),
                DiagonalNoise::from_sigmas([0.01, 0.01, 0.001]),
            )],
            [(0, Pose2D::identity())],
        );
        solver
    }

    fn odom(from: u64, to: u64, x: f64) -> Relation {
        Relation::between(
            from,
            to,
            Pose2D::new(x, 0.0, 0.0),
            DiagonalNoise::from_sigmas([1.0, 1.0, 0.1]),
        )
    }

    #[test]
    fn test_add_batch_does_not_solve() {
        let solver = solver_with_prior();

        assert_eq!(solver.pending_relations().len(), 1);
        assert_eq!(solver.pending_guesses().len(), 1);
        assert_eq!(solver.estimate(0), None);
        assert_eq!(solver.solve_count(), 0);
    }

    #[test]
    fn test_solve_consumes_batch() {
        let mut solver = solver_with_prior();
        solver.add_batch([odom(0, 1, 1.0)], [(1, Pose2D::new(0.8, 0.1, 0.0))]);

        let report = solver.solve().unwrap();

        assert_eq!(report.relations_added, 2);
        assert_eq!(report.nodes_added, 2);
        assert!(solver.pending_relations().is_empty());
        assert!(solver.pending_guesses().is_empty());
        assert_relative_eq!(solver.estimate(1).unwrap().x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_second_solve_only_frees_new_region() {
        let mut solver = solver_with_prior();
        solver.add_batch(
            [odom(0, 1, 1.0), odom(1, 2, 1.0)],
            [(1, Pose2D::new(1.0, 0.0, 0.0)), (2, Pose2D::new(2.0, 0.0, 0.0))],
        );
        solver.solve().unwrap();

        solver.add_batch([odom(2, 3, 1.0)], [(3, Pose2D::new(3.2, 0.0, 0.0))]);
        let report = solver.solve().unwrap();

        assert_eq!(report.free_nodes, 2);
        assert_relative_eq!(solver.estimate(3).unwrap().x, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_guess_for_solved_node_is_ignored() {
        let mut solver = solver_with_prior();
        solver.solve().unwrap();

        solver.add_initial_guess(0, Pose2D::new(9.0, 9.0, 0.0));
        let report = solver.solve().unwrap();

        assert_eq!(report.nodes_added, 0);
        assert_relative_eq!(solver.estimate(0).unwrap().x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_relation_without_guess_is_rejected() {
        let mut solver = solver_with_prior();
        solver.add_relation(odom(0, 5, 1.0));

        let err = solver.solve().unwrap_err();

        assert!(matches!(err, GraphError::InvalidRelation { from: 0, to: 5 }));
        assert_eq!(solver.graph().num_nodes(), 0);
        assert_eq!(solver.pending_relations().len(), 2);
    }

    #[test]
    fn test_divergence_keeps_previous_estimates() {
        let mut solver = solver_with_prior();
        solver.add_batch([odom(0, 1, 1.0)], [(1, Pose2D::new(1.0, 0.0, 0.0))]);
        solver.solve().unwrap();
        let handle = solver.handle();
        let before = handle.snapshot();

        solver.add_batch([odom(1, 2, f64::INFINITY)], [(2, Pose2D::new(2.0, 0.0, 0.0))]);
        let err = solver.solve().unwrap_err();

        assert!(matches!(err, GraphError::SolverDivergence { .. }));
        assert_eq!(solver.estimate(2), None);
        assert_eq!(solver.graph().num_relations(), 2);
        assert_eq!(handle.snapshot().solve_count, before.solve_count);
        assert_eq!(handle.get(2), None);
    }

    #[test]
    fn test_handle_sees_solved_estimates() {
        let mut solver = solver_with_prior();
        let handle = solver.handle();
        assert_eq!(handle.snapshot().solve_count, 0);

        solver.add_batch([odom(0, 1, 2.0)], [(1, Pose2D::new(2.0, 0.0, 0.0))]);
        solver.solve().unwrap();

        let reader = std::thread::spawn(move || handle.get(1));
        let pose = reader.join().unwrap().unwrap();
        assert_relative_eq!(pose.x, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_solve_is_noop() {
        let mut solver = IncrementalPoseGraphSolver::new(GraphOptimizerConfig::default());
        let report = solver.solve().unwrap();
        assert_eq!(report.termination_reason, TerminationReason::NoRelations);
        assert_eq!(solver.solve_count(), 0);
    }
}
