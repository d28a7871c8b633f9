//! Pose event sinks.
//!
//! The back end emits a raw event for every accepted frame and an optimized
//! event after every successful solve. Where those events go is up to the
//! caller:
//!
//! - [`ChannelPublisher`] - forwards to a crossbeam channel (another thread)
//! - [`LogPublisher`] - writes an info line per event
//! - `Vec<PoseEvent>` - collects in memory

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::core::types::Pose2D;

/// Source of a published pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseEventKind {
    /// Composed from accepted odometry, never optimized.
    Raw,
    /// Estimate of a keyframe node after a solve.
    Optimized,
}

/// A published pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseEvent {
    /// Pose node the estimate belongs to.
    pub node: u64,
    /// Global pose.
    pub pose: Pose2D,
    /// Raw or optimized.
    pub kind: PoseEventKind,
    /// Timestamp of the frame that produced the event (microseconds).
    pub timestamp_us: u64,
}

/// Receives pose events from the back end.
pub trait OdometryPublisher {
    /// Publish a single event.
    fn publish(&mut self, event: PoseEvent);
}

impl OdometryPublisher for Vec<PoseEvent> {
    fn publish(&mut self, event: PoseEvent) {
        self.push(event);
    }
}

impl<P: OdometryPublisher + ?Sized> OdometryPublisher for Box<P> {
    fn publish(&mut self, event: PoseEvent) {
        (**self).publish(event);
    }
}

/// Forwards events over a crossbeam channel.
///
/// A disconnected receiver is not an error for the back end; events are
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<PoseEvent>,
    dropped: u64,
}

impl ChannelPublisher {
    /// Wrap an existing sender.
    pub fn new(tx: Sender<PoseEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Create a publisher and the matching unbounded receiver.
    pub fn unbounded() -> (Self, Receiver<PoseEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    /// Events that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl OdometryPublisher for ChannelPublisher {
    fn publish(&mut self, event: PoseEvent) {
        if self.tx.send(event).is_err() {
            if self.dropped == 0 {
                log::warn!("Pose event receiver disconnected, dropping events");
            }
            self.dropped += 1;
        }
    }
}

/// Logs every event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl OdometryPublisher for LogPublisher {
    fn publish(&mut self, event: PoseEvent) {
        log::info!(
            "[{:?}] node {} @ {}us: {}",
            event.kind,
            event.node,
            event.timestamp_us,
            event.pose
        );
    }
}
