//! Frame registration seam.

use crate::core::types::Pose2D;

/// Computes the rigid transform between two frames.
///
/// Implementations are expected to be total (a poor match still returns a
/// value) and deterministic for the same pair of frames. The back end owns
/// when it is called; the frames themselves are never inspected.
pub trait TransformEstimator<F> {
    /// Relative transform (Δx, Δy, Δθ) taking `from` into `to`.
    fn estimate(&mut self, from: &F, to: &F) -> Pose2D;
}

impl<F, E: TransformEstimator<F> + ?Sized> TransformEstimator<F> for Box<E> {
    fn estimate(&mut self, from: &F, to: &F) -> Pose2D {
        (**self).estimate(from, to)
    }
}
