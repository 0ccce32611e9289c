//! Engine configuration, loaded from YAML
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. CLI flags are applied on top by the binary.

use crate::scoring::EmergenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_INTRA_BATCH_THRESHOLD: f32 = 0.50;
const DEFAULT_EVOLUTION_THRESHOLD: f32 = 0.50;
const DEFAULT_CONSOLIDATION_THRESHOLD: f32 = 0.40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Similarity thresholds for the three clustering passes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Grouping within one ingestion batch
    pub intra_batch_threshold: f32,
    /// Batch cluster against the persistent population
    pub evolution_threshold: f32,
    /// Cluster against cluster in the maintenance pass
    pub consolidation_threshold: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            intra_batch_threshold: DEFAULT_INTRA_BATCH_THRESHOLD,
            evolution_threshold: DEFAULT_EVOLUTION_THRESHOLD,
            consolidation_threshold: DEFAULT_CONSOLIDATION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Drop signals without enough history neighbours before clustering
    pub gate_batches: bool,
    pub min_similar: usize,
    /// Neighbours fetched per signal
    pub top_k: usize,
    /// Neighbours below this similarity are ignored
    pub min_similarity: Option<f32>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            gate_batches: false,
            min_similar: crate::clustering::DEFAULT_MIN_SIMILAR,
            top_k: crate::clustering::DEFAULT_TOP_K,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database or JSON file; the binary picks a data-dir location when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub clustering: ClusteringConfig,
    pub persistence: PersistenceConfig,
    pub emergence: EmergenceConfig,
    pub storage: StorageConfig,
}

impl EngineConfig {
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let c = &self.clustering;
        check_threshold("clustering.intra_batch_threshold", c.intra_batch_threshold)?;
        check_threshold("clustering.evolution_threshold", c.evolution_threshold)?;
        check_threshold("clustering.consolidation_threshold", c.consolidation_threshold)?;
        if let Some(min) = self.persistence.min_similarity {
            check_threshold("persistence.min_similarity", min)?;
        }
        if self.persistence.top_k == 0 {
            return Err(ConfigError::Invalid("persistence.top_k must be at least 1".into()));
        }

        let e = &self.emergence;
        if e.recent_days == 0 {
            return Err(ConfigError::Invalid("emergence.recent_days must be at least 1".into()));
        }
        let t = &e.thresholds;
        if !(0.0..=1.0).contains(&t.stable) || !(0.0..=1.0).contains(&t.rapid) {
            return Err(ConfigError::Invalid(format!(
                "emergence thresholds must lie in [0, 1], got rapid={} stable={}",
                t.rapid, t.stable
            )));
        }
        if t.rapid < t.stable {
            return Err(ConfigError::Invalid(format!(
                "emergence.rapid ({}) must not be below emergence.stable ({})",
                t.rapid, t.stable
            )));
        }
        Ok(())
    }
}

fn check_threshold(name: &str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be a finite value in [-1, 1], got {value}"
        )))
    }
}
