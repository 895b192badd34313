//! Configuration management for Slowhand.
//!
//! Handles loading configuration from TOML files. The loaded `Config` is
//! passed explicitly to the job loader and the runner.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Job discovery settings
    pub jobs: JobsConfig,

    /// Run state (checkpoint, scratch directories)
    pub state: StateConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Debug mode: failures propagate and scratch directories are kept
    pub debug: bool,
}

/// Job discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Directories searched for `<job>.yaml` files, in order
    pub dirs: Vec<String>,
}

/// Locations of run state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Checkpoint file override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PathBuf>,

    /// Parent directory for per-run scratch directories (defaults to the system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_root: Option<PathBuf>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { dirs: vec!["~/slowhand".to_string()] }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.slowhand.toml` in current directory
    /// 2. `~/.config/slowhand/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".slowhand.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("slowhand"))
    }

    /// Get the data directory path (for the checkpoint).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("slowhand"))
            .or_else(|| dirs::home_dir().map(|d| d.join(".slowhand")))
    }

    /// Job directories with `~` and environment variables expanded.
    pub fn jobs_dirs(&self) -> Vec<PathBuf> {
        self.jobs
            .dirs
            .iter()
            .map(|dir| match shellexpand::full(dir) {
                Ok(expanded) => PathBuf::from(expanded.as_ref()),
                Err(e) => {
                    tracing::warn!(dir = dir, error = %e, "Cannot expand jobs dir");
                    PathBuf::from(dir)
                }
            })
            .collect()
    }

    /// The single well-known checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        if let Some(ref path) = self.state.checkpoint {
            return path.clone();
        }
        Self::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("checkpoint.json")
    }

    /// Parent directory for run scratch directories.
    pub fn scratch_root(&self) -> PathBuf {
        self.state.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
