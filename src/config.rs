use std::path::PathBuf;

use anyhow::Context;

use crate::registry::MIN_TRAINING_SAMPLES;

pub const DEFAULT_MODEL_DIR: &str = "saved_models";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub model_dir: PathBuf,
    pub min_training_samples: usize,
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            min_training_samples: MIN_TRAINING_SAMPLES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let min_training_samples = match get("MIN_TRAINING_SAMPLES") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("MIN_TRAINING_SAMPLES must be a count, got {value:?}"))?,
            None => defaults.min_training_samples,
        };
        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a count, got {value:?}"))?,
            None => defaults.max_connections,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            model_dir: get("MODEL_DIR").map(PathBuf::from).unwrap_or(defaults.model_dir),
            min_training_samples,
            max_connections,
        })
    }
}
