//! Shared helpers for back end integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use gati_graph::{GatiConfig, KeyframeBackend, Pose2D, PoseEvent, TransformEstimator};

/// Transforms looked up by (from, to) frame id.
///
/// Unscripted pairs return `fallback`. Every call is recorded.
pub struct ScriptedEstimator {
    deltas: HashMap<(u64, u64), Pose2D>,
    fallback: Pose2D,
    pub calls: Vec<(u64, u64)>,
}

impl ScriptedEstimator {
    /// Estimator where unscripted pairs score too low to accept.
    pub fn new() -> Self {
        Self {
            deltas: HashMap::new(),
            fallback: Pose2D::new(0.0, 5.0, 3.0),
            calls: Vec::new(),
        }
    }

    /// Script the transform for a pair.
    pub fn with(mut self, from: u64, to: u64, delta: Pose2D) -> Self {
        self.deltas.insert((from, to), delta);
        self
    }

    /// Script `f(from, to)` for every pair among `ids`.
    pub fn with_all(mut self, ids: &[u64], f: impl Fn(u64, u64) -> Pose2D) -> Self {
        for &a in ids {
            for &b in ids {
                if a < b {
                    self.deltas.insert((a, b), f(a, b));
                }
            }
        }
        self
    }
}

impl TransformEstimator<u64> for ScriptedEstimator {
    fn estimate(&mut self, from: &u64, to: &u64) -> Pose2D {
        self.calls.push((*from, *to));
        self.deltas
            .get(&(*from, *to))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Straight-line motion: frame `i` sits at x = `i * step`.
pub fn line(step: f64) -> impl Fn(u64, u64) -> Pose2D {
    move |a, b| Pose2D::new((b - a) as f64 * step, 0.0, 0.0)
}

pub type TestBackend = KeyframeBackend<u64, ScriptedEstimator, Vec<PoseEvent>>;

/// Back end with default config.
pub fn backend(estimator: ScriptedEstimator) -> TestBackend {
    backend_with(GatiConfig::default(), estimator)
}

/// Back end with `config`.
pub fn backend_with(config: GatiConfig, estimator: ScriptedEstimator) -> TestBackend {
    init_logging();
    KeyframeBackend::new(&config, estimator, Vec::new()).expect("valid config")
}

/// Feed frame ids in order, timestamped 100us apart.
pub fn feed(backend: &mut TestBackend, ids: &[u64]) {
    for &id in ids {
        backend.process_frame(id, id * 100).expect("frame processed");
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
