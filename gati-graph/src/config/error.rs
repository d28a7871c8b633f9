//! Configuration loading errors.

use thiserror::Error;

/// Config load or validation error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for [`GatiConfig`](super::GatiConfig).
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the back end cannot work with.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
