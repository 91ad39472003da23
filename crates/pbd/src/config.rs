//! Combined configuration, loadable from JSON.

use pbd_evolution::{ClothConfig, EvolutionError};
use pbd_rigid::{RigidError, RigidEvolutionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cloth(#[from] EvolutionError),

    #[error(transparent)]
    Rigid(#[from] RigidError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for both evolutions. Missing sections and fields take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub cloth: ClothConfig,
    pub rigid: RigidEvolutionConfig,
}

impl SimulationConfig {
    /// Parse and validate.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        if let Err(error) = config.validate() {
            warn!(%error, "rejected simulation config");
            return Err(error);
        }
        debug!(
            cloth_iterations = config.cloth.iterations,
            rigid_iterations = config.rigid.iterations,
            "loaded simulation config"
        );
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading simulation config");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.cloth.evolution().validate()?;
        self.rigid.validate()?;
        Ok(())
    }
}
