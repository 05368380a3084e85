use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{SyncError, SyncResult};

/// Session configuration, loadable from a camelCase JSON file. Every field
/// has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub push_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub poll_interval_secs: u64,
    pub initial_pull_delay_ms: u64,
    pub reconnect_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub alert_asset: PathBuf,
    pub alert_volume: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: constants::API_BASE_URL.to_string(),
            push_addr: constants::PUSH_ADDR.to_string(),
            auth_token: None,
            poll_interval_secs: constants::POLL_INTERVAL_SECS,
            initial_pull_delay_ms: constants::INITIAL_PULL_DELAY_MS,
            reconnect_delay_secs: constants::RECONNECT_DELAY_SECS,
            request_timeout_secs: constants::REQUEST_TIMEOUT_SECS,
            alert_asset: PathBuf::from(constants::ALERT_ASSET),
            alert_volume: constants::ALERT_VOLUME,
        }
    }
}

impl SyncConfig {
    /// Load config from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| SyncError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Apply `OPSDESK_API_URL`, `OPSDESK_PUSH_ADDR` and `OPSDESK_TOKEN`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("OPSDESK_API_URL") {
            self.api_base_url = url;
        }
        if let Some(addr) = lookup("OPSDESK_PUSH_ADDR") {
            self.push_addr = addr;
        }
        if let Some(token) = lookup("OPSDESK_TOKEN") {
            self.auth_token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(SyncError::Config {
                message: "apiBaseUrl must not be empty".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(SyncError::Config {
                message: "pollIntervalSecs must be greater than zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.alert_volume) {
            return Err(SyncError::Config {
                message: format!("alertVolume {} is outside 0.0..=1.0", self.alert_volume),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_pull_delay(&self) -> Duration {
        Duration::from_millis(self.initial_pull_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
