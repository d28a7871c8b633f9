//! Sliding window of accepted frames since the last keyframe.
//!
//! Slot 0 is always the carry-over frame of the most recent keyframe; slots
//! `1..=N` are frames accepted since. Each slot owns its scratch values, so
//! dropping or resetting the window can never leave stale deltas behind.

use crate::core::types::{Pose2D, Timestamped};

/// One frame in the window plus its per-slot scratch.
#[derive(Debug, Clone)]
pub struct WindowSlot<F> {
    /// The opaque frame payload and its timestamp.
    pub frame: Timestamped<F>,

    /// Pose node this frame became, once accepted.
    pub node: Option<u64>,

    /// Accepted odometry delta (from the anchor slot to this one).
    pub odometry_delta: Option<Pose2D>,

    /// Transform from slot 0 to this slot, cached for keyframe scoring.
    pub keyframe_delta: Option<Pose2D>,
}

impl<F> WindowSlot<F> {
    fn new(frame: Timestamped<F>) -> Self {
        Self {
            frame,
            node: None,
            odometry_delta: None,
            keyframe_delta: None,
        }
    }
}

/// Ordered, growable and truncatable sequence of frames.
#[derive(Debug, Clone)]
pub struct FrameWindow<F> {
    slots: Vec<WindowSlot<F>>,
}

impl<F> Default for FrameWindow<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> FrameWindow<F> {
    /// Create an empty window. The first frame appended becomes slot 0.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Append a frame as the newest slot and return its index.
    pub fn append(&mut self, frame: Timestamped<F>) -> usize {
        self.slots.push(WindowSlot::new(frame));
        self.slots.len() - 1
    }

    /// Remove the newest slot.
    ///
    /// Slot 0 is never removed; returns `None` if only it remains.
    pub fn drop_last(&mut self) -> Option<Timestamped<F>> {
        if self.slots.len() <= 1 {
            return None;
        }
        self.slots.pop().map(|slot| slot.frame)
    }

    /// Keep only `slot`, which becomes the new slot 0 with cleared scratch.
    ///
    /// Returns the new slot 0, or `None` (window unchanged) if `slot` is out
    /// of range.
    pub fn reset_to(&mut self, slot: usize) -> Option<&WindowSlot<F>> {
        if slot >= self.slots.len() {
            return None;
        }
        let mut kept = self.slots.swap_remove(slot);
        kept.odometry_delta = None;
        kept.keyframe_delta = None;
        self.slots.clear();
        self.slots.push(kept);
        self.slots.first()
    }

    /// Number of frames held, including slot 0.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True before the first frame arrives.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Frames accumulated since the last reset (N).
    #[inline]
    pub fn accumulated(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    /// Index of the newest slot, if any.
    #[inline]
    pub fn newest(&self) -> Option<usize> {
        self.slots.len().checked_sub(1)
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&WindowSlot<F>> {
        self.slots.get(index)
    }

    /// Frame stored at `index`.
    pub fn frame(&self, index: usize) -> Option<&Timestamped<F>> {
        self.slots.get(index).map(|s| &s.frame)
    }

    /// Pose node assigned to `index`.
    pub fn node(&self, index: usize) -> Option<u64> {
        self.slots.get(index).and_then(|s| s.node)
    }

    /// Assign the pose node of a slot.
    pub fn assign_node(&mut self, index: usize, node: u64) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.node = Some(node);
        }
    }

    /// Cached transform from slot 0 to `index`.
    pub fn keyframe_delta(&self, index: usize) -> Option<Pose2D> {
        self.slots.get(index).and_then(|s| s.keyframe_delta)
    }

    /// Cache the transform from slot 0 to `index`.
    pub fn set_keyframe_delta(&mut self, index: usize, delta: Pose2D) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.keyframe_delta = Some(delta);
        }
    }

    /// Record the accepted odometry delta of a slot.
    pub fn set_odometry_delta(&mut self, index: usize, delta: Pose2D) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.odometry_delta = Some(delta);
        }
    }

    /// Iterate over slots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &WindowSlot<F>> {
        self.slots.iter()
    }
}
