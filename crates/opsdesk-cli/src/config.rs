use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use opsdesk_core::SyncConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file. Session settings
/// sit at the top level next to the CLI-only ones.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Identity joined on the push channel when `--identity` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(flatten)]
    pub sync: SyncConfig,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// `~/.config/opsdesk/config.json` (platform equivalent elsewhere)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("opsdesk").join("config.json"))
    }

    /// Explicit path, else the default path if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        config.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.sync = self.sync.with_env_overrides();
        self.sync.validate().context("Invalid configuration")?;
        Ok(self)
    }
}
