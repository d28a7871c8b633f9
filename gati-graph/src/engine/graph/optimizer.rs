//! Levenberg-Marquardt optimization over a subset of pose nodes.
//!
//! Minimizes
//!
//! ```text
//! F(x) = Σ e_k(x)^T * Ω_k * e_k(x)
//! ```
//!
//! over the *free* nodes only; every other node referenced by a relation is
//! held at its stored estimate. Each iteration solves the damped normal
//! equations
//!
//! ```text
//! (H + λ·diag(H)) * Δx = -b
//! ```
//!
//! with a dense Cholesky factorization. Steps that do not reduce the error
//! are rejected and λ grows; accepted steps shrink λ.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::pose_graph::PoseGraph;
use super::relation::Relation;
use crate::config::defaults;
use crate::core::math::normalize_angle;
use crate::core::types::Pose2D;
use crate::error::{GraphError, Result};

/// Errors below this are treated as an exact fit.
const EXACT_FIT: f64 = 1e-18;

/// Configuration for graph optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOptimizerConfig {
    /// Maximum number of iterations per solve.
    #[serde(default = "defaults::max_iterations")]
    pub max_iterations: u32,

    /// Relative chi-squared change below which the solve has converged.
    #[serde(default = "defaults::convergence_threshold")]
    pub convergence_threshold: f64,

    /// Starting Levenberg-Marquardt damping.
    #[serde(default = "defaults::initial_damping")]
    pub initial_damping: f64,

    /// Damping at which a solve gives up improving.
    #[serde(default = "defaults::max_damping")]
    pub max_damping: f64,
}

impl Default for GraphOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: defaults::max_iterations(),
            convergence_threshold: defaults::convergence_threshold(),
            initial_damping: defaults::initial_damping(),
            max_damping: defaults::max_damping(),
        }
    }
}

/// Reason for optimization termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// Relative error change fell below the threshold.
    Converged,

    /// Maximum iterations reached.
    MaxIterations,

    /// No step reduced the error before damping saturated.
    Stalled,

    /// No relation touches a free node.
    NoRelations,
}

/// Result of a successful optimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Number of iterations performed.
    pub iterations: u32,

    /// Chi-squared error at the initial guess.
    pub initial_error: f64,

    /// Chi-squared error at the returned estimate.
    pub final_error: f64,

    /// Whether the error change converged.
    pub converged: bool,

    /// Reason for termination.
    pub termination_reason: TerminationReason,

    /// Optimized poses of the free nodes, in the order they were given.
    pub poses: Vec<(u64, Pose2D)>,
}

/// Where a relation endpoint reads its pose from.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Free(usize),
    Fixed(Pose2D),
}

impl Slot {
    fn pose(&self, estimate: &[Pose2D]) -> Pose2D {
        match *self {
            Slot::Free(col) => estimate[col],
            Slot::Fixed(pose) => pose,
        }
    }

    fn column(&self) -> Option<usize> {
        match *self {
            Slot::Free(col) => Some(col),
            Slot::Fixed(_) => None,
        }
    }
}

/// One relation bound to its endpoint slots.
struct Term<'a> {
    relation: &'a Relation,
    a: Slot,
    b: Option<Slot>,
}

/// Residual and Jacobians of one term at the current estimate.
///
/// Jacobians are `rows x 3`, row-major; only the first `rows` rows of each
/// array are meaningful.
struct Linearized {
    rows: usize,
    residual: [f64; 3],
    information: [f64; 3],
    jac_a: [f64; 9],
    jac_b: Option<[f64; 9]>,
}

impl Linearized {
    fn chi_squared(&self) -> f64 {
        (0..self.rows)
            .map(|k| self.information[k] * self.residual[k] * self.residual[k])
            .sum()
    }
}

/// Graph optimizer using Levenberg-Marquardt.
#[derive(Debug, Clone)]
pub struct GraphOptimizer {
    config: GraphOptimizerConfig,
}

impl GraphOptimizer {
    /// Create a new graph optimizer.
    pub fn new(config: GraphOptimizerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GraphOptimizerConfig {
        &self.config
    }

    /// Optimize the poses of `free` nodes against every relation touching them.
    ///
    /// The graph is not modified; the caller commits the returned poses.
    /// Fails with [`GraphError::SolverDivergence`] when the problem produces
    /// non-finite values or the damped system cannot be factorized.
    pub fn optimize(&self, graph: &PoseGraph, free: &[u64]) -> Result<OptimizationResult> {
        let columns: HashMap<u64, usize> =
            free.iter().enumerate().map(|(col, &id)| (id, col)).collect();

        let mut estimate = Vec::with_capacity(free.len());
        for &id in free {
            estimate.push(graph.pose(id).ok_or(GraphError::UnknownNode(id))?);
        }

        let terms = collect_terms(graph, free, &columns)?;
        if terms.is_empty() {
            return Ok(OptimizationResult {
                iterations: 0,
                initial_error: 0.0,
                final_error: 0.0,
                converged: true,
                termination_reason: TerminationReason::NoRelations,
                poses: free.iter().copied().zip(estimate).collect(),
            });
        }

        let dim = free.len() * 3;
        let initial_error = chi_squared(&terms, &estimate);
        if !initial_error.is_finite() {
            return Err(divergence("initial error is not finite", 0));
        }

        let mut current_error = initial_error;
        let mut lambda = self.config.initial_damping;
        let mut iterations = 0;
        let mut termination = TerminationReason::MaxIterations;

        while iterations < self.config.max_iterations {
            if current_error < EXACT_FIT {
                termination = TerminationReason::Converged;
                break;
            }
            iterations += 1;

            let (h, b) = build_linear_system(&terms, &estimate, dim);
            if h.iter().chain(b.iter()).any(|v| !v.is_finite()) {
                return Err(divergence("linear system is not finite", iterations));
            }

            let Some(dx) = solve_linear_system(&apply_damping(&h, lambda, dim), &b, dim) else {
                lambda *= 10.0;
                if lambda > self.config.max_damping {
                    return Err(divergence(
                        "damped system is not positive definite",
                        iterations,
                    ));
                }
                continue;
            };

            let candidate = apply_update(&estimate, &dx);
            let new_error = chi_squared(&terms, &candidate);

            if !new_error.is_finite() || new_error >= current_error {
                lambda *= 10.0;
                if lambda > self.config.max_damping {
                    termination = TerminationReason::Stalled;
                    break;
                }
                continue;
            }

            lambda = (lambda * 0.1).max(1e-12);
            let relative_change = (current_error - new_error) / current_error.max(1e-12);
            estimate = candidate;
            current_error = new_error;

            if relative_change < self.config.convergence_threshold {
                termination = TerminationReason::Converged;
                break;
            }
        }

        if estimate.iter().any(|p| !p.is_finite()) {
            return Err(divergence("estimate is not finite", iterations));
        }

        Ok(OptimizationResult {
            iterations,
            initial_error,
            final_error: current_error,
            converged: termination == TerminationReason::Converged,
            termination_reason: termination,
            poses: free.iter().copied().zip(estimate).collect(),
        })
    }
}

fn divergence(reason: &str, iterations: u32) -> GraphError {
    GraphError::SolverDivergence {
        reason: reason.to_string(),
        iterations,
    }
}

/// Gather relations touching at least one free node, bound to their slots.
fn collect_terms<'a>(
    graph: &'a PoseGraph,
    free: &[u64],
    columns: &HashMap<u64, usize>,
) -> Result<Vec<Term<'a>>> {
    let mut indices: Vec<usize> = free
        .iter()
        .flat_map(|&id| graph.relations_of(id).iter().copied())
        .collect();
    indices.sort_unstable();
    indices.dedup();

    let slot = |id: u64| -> Option<Slot> {
        match columns.get(&id) {
            Some(&col) => Some(Slot::Free(col)),
            None => graph.pose(id).map(Slot::Fixed),
        }
    };

    indices
        .into_iter()
        .map(|idx| {
            let relation = &graph.relations()[idx];
            let (a, b) = relation.nodes();
            let invalid = || GraphError::InvalidRelation {
                from: a,
                to: b.unwrap_or(a),
            };
            let slot_a = slot(a).ok_or_else(invalid)?;
            let slot_b = match b {
                Some(b) => Some(slot(b).ok_or_else(invalid)?),
                None => None,
            };
            Ok(Term {
                relation,
                a: slot_a,
                b: slot_b,
            })
        })
        .collect()
}

/// Evaluate residual and Jacobians of a term.
fn linearize(term: &Term<'_>, estimate: &[Pose2D]) -> Linearized {
    let xa = term.a.pose(estimate);
    let xb = term.b.map(|slot| slot.pose(estimate)).unwrap_or(xa);

    match *term.relation {
        Relation::Prior { pose, noise, .. } => Linearized {
            rows: 3,
            residual: [
                xa.x - pose.x,
                xa.y - pose.y,
                normalize_angle(xa.theta - pose.theta),
            ],
            information: noise.information(),
            jac_a: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            jac_b: None,
        },
        Relation::Between { delta, noise, .. } => {
            let predicted = xa.between(&xb);
            let (ji, jj) = between_jacobians(&xa, &xb);
            Linearized {
                rows: 3,
                residual: [
                    predicted.x - delta.x,
                    predicted.y - delta.y,
                    normalize_angle(predicted.theta - delta.theta),
                ],
                information: noise.information(),
                jac_a: ji,
                jac_b: Some(jj),
            }
        }
        Relation::RotationOnly {
            delta_theta, sigma, ..
        } => Linearized {
            rows: 1,
            residual: [normalize_angle(xb.theta - xa.theta - delta_theta), 0.0, 0.0],
            information: [1.0 / (sigma * sigma), 0.0, 0.0],
            jac_a: [0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            jac_b: Some([0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        },
    }
}

/// Jacobians of `xi⁻¹ ⊕ xj` with respect to xi and xj (3x3, row-major).
fn between_jacobians(xi: &Pose2D, xj: &Pose2D) -> ([f64; 9], [f64; 9]) {
    let (sin_i, cos_i) = xi.theta.sin_cos();
    let dx = xj.x - xi.x;
    let dy = xj.y - xi.y;

    let ji = [
        -cos_i,
        -sin_i,
        -sin_i * dx + cos_i * dy,
        sin_i,
        -cos_i,
        -cos_i * dx - sin_i * dy,
        0.0,
        0.0,
        -1.0,
    ];

    let jj = [
        cos_i, sin_i, 0.0, //
        -sin_i, cos_i, 0.0, //
        0.0, 0.0, 1.0,
    ];

    (ji, jj)
}

fn chi_squared(terms: &[Term<'_>], estimate: &[Pose2D]) -> f64 {
    terms
        .iter()
        .map(|term| linearize(term, estimate).chi_squared())
        .sum()
}

/// Build H = Σ Jᵀ Ω J and b = Σ Jᵀ Ω e over the free columns.
fn build_linear_system(
    terms: &[Term<'_>],
    estimate: &[Pose2D],
    dim: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut h = vec![0.0; dim * dim];
    let mut b = vec![0.0; dim];

    for term in terms {
        let lin = linearize(term, estimate);
        let blocks = [
            (term.a.column(), Some(lin.jac_a)),
            (term.b.and_then(|s| s.column()), lin.jac_b),
        ];

        for &(col_p, jac_p) in &blocks {
            let (Some(col_p), Some(jac_p)) = (col_p, jac_p) else {
                continue;
            };
            let base_p = col_p * 3;

            for r in 0..3 {
                b[base_p + r] += (0..lin.rows)
                    .map(|k| jac_p[k * 3 + r] * lin.information[k] * lin.residual[k])
                    .sum::<f64>();
            }

            for &(col_q, jac_q) in &blocks {
                let (Some(col_q), Some(jac_q)) = (col_q, jac_q) else {
                    continue;
                };
                let base_q = col_q * 3;
                for r in 0..3 {
                    for c in 0..3 {
                        h[(base_p + r) * dim + base_q + c] += (0..lin.rows)
                            .map(|k| jac_p[k * 3 + r] * lin.information[k] * jac_q[k * 3 + c])
                            .sum::<f64>();
                    }
                }
            }
        }
    }

    (h, b)
}

/// Levenberg-Marquardt damping of the diagonal.
fn apply_damping(h: &[f64], lambda: f64, dim: usize) -> Vec<f64> {
    let mut h_damped = h.to_vec();
    for i in 0..dim {
        h_damped[i * dim + i] += lambda * h_damped[i * dim + i].max(1.0);
    }
    h_damped
}

/// Solve H * dx = -b with a dense Cholesky factorization.
///
/// Returns `None` if H is not positive definite.
fn solve_linear_system(h: &[f64], b: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];

    for i in 0..dim {
        for j in 0..=i {
            let mut sum = h[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * dim + j] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }

    // L * y = b
    let mut y = vec![0.0; dim];
    for i in 0..dim {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * dim + j] * y[j];
        }
        y[i] = sum / l[i * dim + i];
    }

    // Lᵀ * x = y
    let mut x = vec![0.0; dim];
    for i in (0..dim).rev() {
        let mut sum = y[i];
        for j in (i + 1)..dim {
            sum -= l[j * dim + i] * x[j];
        }
        x[i] = sum / l[i * dim + i];
    }

    Some(x.iter().map(|v| -v).collect())
}

fn apply_update(estimate: &[Pose2D], dx: &[f64]) -> Vec<Pose2D> {
    estimate
        .iter()
        .enumerate()
        .map(|(col, pose)| {
            let base = col * 3;
            Pose2D::new(
                pose.x + dx[base],
                pose.y + dx[base + 1],
                pose.theta + dx[base + 2],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::pose_graph::PoseNode;
    use crate::engine::graph::relation::DiagonalNoise;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn prior_noise() -> DiagonalNoise {
        DiagonalNoise::from_sigmas([0.01, 0.01, 0.001])
    }

    fn odom_noise() -> DiagonalNoise {
        DiagonalNoise::from_sigmas([1.0, 1.0, 0.1])
    }

    fn chain_graph(guesses: &[Pose2D]) -> PoseGraph {
        let mut graph = PoseGraph::new();
        for (id, pose) in guesses.iter().enumerate() {
            graph.add_node(PoseNode::new(id as u64, *pose));
        }
        graph.add_relation(Relation::prior(0, Pose2D::identity(), prior_noise()));
        graph
    }

    #[test]
    fn test_no_relations() {
        let mut graph = PoseGraph::new();
        graph.add_node(PoseNode::new(0, Pose2D::identity()));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[0]).unwrap();

        assert_eq!(result.termination_reason, TerminationReason::NoRelations);
        assert_eq!(result.poses.len(), 1);
    }

    #[test]
    fn test_perfect_chain_has_zero_error() {
        let mut graph = chain_graph(&[Pose2D::identity(), Pose2D::new(1.0, 0.0, 0.0)]);
        graph.add_relation(Relation::between(0, 1, Pose2D::new(1.0, 0.0, 0.0), odom_noise()));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[0, 1]).unwrap();

        assert!(result.converged);
        assert!(result.initial_error < 1e-12);
        assert_relative_eq!(result.poses[1].1.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_chain_recovers_from_bad_guess() {
        let mut graph = chain_graph(&[
            Pose2D::identity(),
            Pose2D::new(0.5, 0.3, 0.2),
            Pose2D::new(2.5, -0.4, -0.1),
        ]);
        graph.add_relation(Relation::between(0, 1, Pose2D::new(1.0, 0.0, 0.0), odom_noise()));
        graph.add_relation(Relation::between(1, 2, Pose2D::new(1.0, 0.0, 0.0), odom_noise()));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[0, 1, 2]).unwrap();

        assert!(result.final_error < result.initial_error);
        let (_, p2) = result.poses[2];
        assert_relative_eq!(p2.x, 2.0, epsilon = 1e-3);
        assert_relative_eq!(p2.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(p2.theta, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_rotation_only_pulls_heading() {
        // Odometry says node 1 turned 0.2 rad; a tight rotation-only
        // relation says 0.1 rad. The tighter sigma should dominate.
        let mut graph = chain_graph(&[Pose2D::identity(), Pose2D::new(1.0, 0.0, 0.2)]);
        graph.add_relation(Relation::between(0, 1, Pose2D::new(1.0, 0.0, 0.2), odom_noise()));
        graph.add_relation(Relation::rotation_only(0, 1, 0.1, 0.001));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[0, 1]).unwrap();

        let (_, p1) = result.poses[1];
        assert_relative_eq!(p1.theta, 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_fixed_nodes_are_not_moved() {
        let mut graph = chain_graph(&[
            Pose2D::identity(),
            Pose2D::new(1.0, 0.0, 0.0),
            Pose2D::new(1.7, 0.2, 0.0),
        ]);
        graph.add_relation(Relation::between(0, 1, Pose2D::new(1.0, 0.0, 0.0), odom_noise()));
        graph.add_relation(Relation::between(1, 2, Pose2D::new(1.0, 0.0, 0.0), odom_noise()));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[2]).unwrap();

        assert_eq!(result.poses.len(), 1);
        let (id, p2) = result.poses[0];
        assert_eq!(id, 2);
        assert_relative_eq!(p2.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(p2.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_turning_chain() {
        let quarter = Pose2D::new(1.0, 0.0, FRAC_PI_2);
        let mut graph = chain_graph(&[
            Pose2D::identity(),
            Pose2D::new(1.1, 0.1, 1.4),
            Pose2D::new(0.9, 1.2, 3.0),
        ]);
        graph.add_relation(Relation::between(0, 1, quarter, odom_noise()));
        graph.add_relation(Relation::between(1, 2, quarter, odom_noise()));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let result = optimizer.optimize(&graph, &[0, 1, 2]).unwrap();

        let (_, p2) = result.poses[2];
        assert_relative_eq!(p2.x, 1.0, epsilon = 1e-3);
        assert_relative_eq!(p2.y, 1.0, epsilon = 1e-3);
        assert_relative_eq!(p2.theta.abs(), std::f64::consts::PI, epsilon = 1e-3);
    }

    #[test]
    fn test_non_finite_measurement_diverges() {
        let mut graph = chain_graph(&[Pose2D::identity(), Pose2D::new(1.0, 0.0, 0.0)]);
        graph.add_relation(Relation::between(
            0,
            1,
            Pose2D {
                x: f64::NAN,
                y: 0.0,
                theta: 0.0,
            },
            odom_noise(),
        ));

        let optimizer = GraphOptimizer::new(GraphOptimizerConfig::default());
        let err = optimizer.optimize(&graph, &[0, 1]).unwrap_err();

        assert!(matches!(err, GraphError::SolverDivergence { .. }));
    }

    #[test]
    fn test_cholesky_identity() {
        let h = [2.0, 0.0, 0.0, 2.0];
        let b = [4.0, -2.0];
        let x = solve_linear_system(&h, &b, 2).unwrap();
        assert_relative_eq!(x[0], -2.0);
        assert_relative_eq!(x[1], 1.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let h = [1.0, 2.0, 2.0, 1.0];
        assert!(solve_linear_system(&h, &[1.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_between_jacobian_matches_finite_difference() {
        let xi = Pose2D::new(0.3, -0.2, 0.4);
        let xj = Pose2D::new(1.5, 0.9, -0.3);
        let (ji, _) = between_jacobians(&xi, &xj);

        let eps = 1e-7;
        let base = xi.between(&xj);
        let bumped = Pose2D {
            theta: xi.theta + eps,
            ..xi
        }
        .between(&xj);

        assert_relative_eq!((bumped.x - base.x) / eps, ji[2], epsilon = 1e-5);
        assert_relative_eq!((bumped.y - base.y) / eps, ji[5], epsilon = 1e-5);
    }
}
