//! `routectl.toml` loading (spec ambient stack), mirroring the teacher's
//! `.shipper.toml` loader in `config.rs`: a `#[serde(default)]` struct read
//! with `toml::from_str`, absent entirely when the file doesn't exist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use routectl_appliers::DEFAULT_APPLY_ORDER;

const CONFIG_FILE_NAME: &str = "routectl.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfSettings {
    #[serde(default = "default_active_dir")]
    pub active_dir: PathBuf,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Empty means "use the built-in network/firewall/dhcp order".
    #[serde(default)]
    pub apply_order: Vec<String>,

    /// `0` (the default) means "no confirm window: commit completes
    /// immediately" — see spec §4.6.
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout: String,

    /// `0` means "no overall timeout".
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout: String,

    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,

    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

impl Default for RouterConfSettings {
    fn default() -> Self {
        Self {
            active_dir: default_active_dir(),
            snapshot_dir: default_snapshot_dir(),
            apply_order: Vec::new(),
            confirm_timeout: default_confirm_timeout(),
            overall_timeout: default_overall_timeout(),
            snapshot_retention: default_snapshot_retention(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

fn default_active_dir() -> PathBuf {
    PathBuf::from("/etc/config")
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("/etc/routectl/snapshots")
}

fn default_confirm_timeout() -> String {
    "0s".to_string()
}

fn default_overall_timeout() -> String {
    "0s".to_string()
}

fn default_snapshot_retention() -> usize {
    20
}

fn default_min_free_bytes() -> u64 {
    1024 * 1024
}

impl RouterConfSettings {
    /// Search `dir` for `routectl.toml`; `Ok(None)` means none was found,
    /// in which case callers should fall back to [`RouterConfSettings::default`].
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn apply_order(&self) -> Vec<String> {
        if self.apply_order.is_empty() {
            DEFAULT_APPLY_ORDER.iter().map(|s| s.to_string()).collect()
        } else {
            self.apply_order.clone()
        }
    }

    pub fn confirm_timeout_duration(&self) -> Result<Duration> {
        humantime::parse_duration(&self.confirm_timeout)
            .with_context(|| format!("invalid confirm_timeout: {}", self.confirm_timeout))
    }

    pub fn overall_timeout_duration(&self) -> Result<Duration> {
        humantime::parse_duration(&self.overall_timeout)
            .with_context(|| format!("invalid overall_timeout: {}", self.overall_timeout))
    }
}
