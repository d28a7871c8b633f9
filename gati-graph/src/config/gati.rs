//! Main configuration and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::engine::graph::{GraphOptimizerConfig, NoiseConfig};
use crate::engine::{KeyframeSelectorConfig, OdometryFactorConfig};

/// Default config location relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "configs/gati.toml";

/// Full back end configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatiConfig {
    /// Odometry acceptance settings
    #[serde(default)]
    pub odometry: OdometryFactorConfig,

    /// Keyframe selection heuristics
    #[serde(default)]
    pub keyframe: KeyframeSelectorConfig,

    /// Relation noise sigmas
    #[serde(default)]
    pub noise: NoiseConfig,

    /// Nonlinear solver settings
    #[serde(default)]
    pub solver: GraphOptimizerConfig,
}

impl GatiConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from `configs/gati.toml`, falling back to defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the estimator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let odom = &self.odometry;
        require_non_negative("odometry.resol", odom.resol)?;
        require_non_negative("odometry.odom_threshold", odom.odom_threshold)?;

        let kf = &self.keyframe;
        if !(kf.keyframe_threshold > 0.0 && kf.keyframe_threshold <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "keyframe.keyframe_threshold",
                reason: format!("{} is outside (0, 1]", kf.keyframe_threshold),
            });
        }
        require_non_negative("keyframe.veto_min_motion", kf.veto_min_motion)?;
        require_non_negative("keyframe.max_lateral", kf.max_lateral)?;
        require_non_negative("keyframe.max_rotation_deg", kf.max_rotation_deg)?;
        require_non_negative("keyframe.large_first_motion", kf.large_first_motion)?;
        if kf.min_accepted_per_solve == 0 {
            return Err(ConfigError::Invalid {
                field: "keyframe.min_accepted_per_solve",
                reason: "must be at least 1".to_string(),
            });
        }

        let noise = &self.noise;
        require_sigmas("noise.prior", &noise.prior)?;
        require_sigmas("noise.odometry", &noise.odometry)?;
        require_sigmas("noise.keyframe", &noise.keyframe)?;
        require_sigmas("noise.rotation", &[noise.rotation])?;

        let solver = &self.solver;
        if solver.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "solver.max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        require_positive("solver.convergence_threshold", solver.convergence_threshold)?;
        require_positive("solver.initial_damping", solver.initial_damping)?;
        if solver.max_damping <= solver.initial_damping {
            return Err(ConfigError::Invalid {
                field: "solver.max_damping",
                reason: "must exceed solver.initial_damping".to_string(),
            });
        }

        Ok(())
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a finite non-negative number", value),
        })
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a finite positive number", value),
        })
    }
}

fn require_sigmas(field: &'static str, sigmas: &[f64]) -> Result<(), ConfigError> {
    sigmas
        .iter()
        .try_for_each(|&sigma| require_positive(field, sigma))
}
