//! Core data types.
//!
//! - [`Pose2D`]: Planar rigid pose / relative transform (x, y, theta)
//! - [`Timestamped<T>`]: Generic timestamp wrapper

mod pose;
mod timestamped;

pub use pose::Pose2D;
pub use timestamped::Timestamped;
