//! Unified configuration loading.
//!
//! All parameters are read once at startup from a single TOML file and stay
//! constant afterwards. Every field has a default, so an empty file is valid.
//!
//! ## Example TOML
//!
//! ```toml
//! [odometry]
//! resol = 0.01            # negligible-motion translation threshold
//! odom_threshold = 0.3    # minimum direction score to accept odometry
//!
//! [keyframe]
//! keyframe_threshold = 0.5
//! max_accumulated_frames = 3
//! min_accepted_per_solve = 2
//!
//! [noise]
//! prior = [0.01, 0.01, 0.001]
//! odometry = [1.0, 1.0, 0.1]
//! rotation = 0.01
//!
//! [solver]
//! max_iterations = 100
//! ```

pub(crate) mod defaults;
mod error;
mod gati;

pub use error::ConfigError;
pub use gati::GatiConfig;
