use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapter::netmask_prefix_len;
use crate::error::WardenError;

/// Fixed placeholder returned in place of a non-empty passphrase.
pub const SECRET_PLACEHOLDER: &str = "********";

/// WPA2-PSK minimum passphrase length.
const MIN_PASSPHRASE_LEN: usize = 8;

/// Persisted access point settings.
///
/// Every field carries a compiled-in default so an older persisted file
/// missing newer keys is upgraded transparently on load. Unknown keys are
/// kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApConfig {
    pub ssid: String,
    /// Empty string means an open network.
    pub passphrase: String,
    pub ip_address: String,
    pub netmask: String,
    pub channel: u8,
    pub poll_interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub ap_interface: String,
    pub client_interface: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: "Warden-Setup".to_string(),
            passphrase: "warden123".to_string(),
            ip_address: "192.168.4.1".to_string(),
            netmask: "255.255.255.0".to_string(),
            channel: 7,
            poll_interval_seconds: 60,
            probe_timeout_seconds: 10,
            ap_interface: "wlan1".to_string(),
            client_interface: "wlan0".to_string(),
            extra: serde_json::Map::new(),
        }
    }
}

impl ApConfig {
    /// Semantic validation. Interface availability against discovered
    /// hardware is checked separately by the controller.
    pub fn validate(&self) -> Result<(), WardenError> {
        if self.ssid.is_empty() {
            return Err(WardenError::Config("ssid must not be empty".into()));
        }
        if !self.passphrase.is_empty() && self.passphrase.len() < MIN_PASSPHRASE_LEN {
            return Err(WardenError::Config(format!(
                "passphrase must be at least {MIN_PASSPHRASE_LEN} characters or empty for an open network"
            )));
        }
        if !(1..=13).contains(&self.channel) {
            return Err(WardenError::Config(format!(
                "channel {} is outside the 1-13 range",
                self.channel
            )));
        }
        if self.ip_address.parse::<std::net::Ipv4Addr>().is_err() {
            return Err(WardenError::Config(format!(
                "'{}' is not a valid IPv4 address",
                self.ip_address
            )));
        }
        if netmask_prefix_len(&self.netmask).is_none() {
            return Err(WardenError::Config(format!(
                "'{}' is not a valid netmask",
                self.netmask
            )));
        }
        if self.poll_interval_seconds == 0 {
            return Err(WardenError::Config(
                "poll_interval_seconds must be positive".into(),
            ));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(WardenError::Config(
                "probe_timeout_seconds must be positive".into(),
            ));
        }
        if self.ap_interface == self.client_interface {
            return Err(WardenError::Config(
                "ap and client roles must use different interfaces".into(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with the passphrase replaced by [`SECRET_PLACEHOLDER`]
    /// when non-empty. The literal value never leaves the process.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if !masked.passphrase.is_empty() {
            masked.passphrase = SECRET_PLACEHOLDER.to_string();
        }
        masked
    }

    /// Applies a partial update over this config, returning the merged
    /// result. The caller validates before adopting it.
    pub fn merged(&self, update: &ApConfigUpdate) -> Self {
        let mut merged = self.clone();
        if let Some(ssid) = &update.ssid {
            merged.ssid = ssid.clone();
        }
        if let Some(passphrase) = &update.passphrase {
            merged.passphrase = passphrase.clone();
        }
        if let Some(ip_address) = &update.ip_address {
            merged.ip_address = ip_address.clone();
        }
        if let Some(netmask) = &update.netmask {
            merged.netmask = netmask.clone();
        }
        if let Some(channel) = update.channel {
            merged.channel = channel;
        }
        if let Some(poll) = update.poll_interval_seconds {
            merged.poll_interval_seconds = poll;
        }
        if let Some(probe) = update.probe_timeout_seconds {
            merged.probe_timeout_seconds = probe;
        }
        if let Some(ap_interface) = &update.ap_interface {
            merged.ap_interface = ap_interface.clone();
        }
        if let Some(client_interface) = &update.client_interface {
            merged.client_interface = client_interface.clone();
        }
        merged
    }
}

/// Partial config update, as received from the HTTP surface or CLI.
/// Absent fields keep their current value.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ApConfigUpdate {
    pub ssid: Option<String>,
    pub passphrase: Option<String>,
    pub ip_address: Option<String>,
    pub netmask: Option<String>,
    pub channel: Option<u8>,
    pub poll_interval_seconds: Option<u64>,
    pub probe_timeout_seconds: Option<u64>,
    pub ap_interface: Option<String>,
    pub client_interface: Option<String>,
}

/// JSON-backed configuration store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("wifi-warden").join("ap_config.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Loads the persisted config, merging it over compiled-in defaults.
    /// Any read or parse failure logs a warning and falls back to defaults;
    /// load never fails.
    pub fn load(&self) -> ApConfig {
        if !self.path.exists() {
            let config = ApConfig::default();
            // First run: persist the defaults so operators can edit them
            if let Err(err) = self.save(&config) {
                warn!(path = %self.path.display(), %err, "failed to write initial config");
            }
            return config;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<ApConfig>(&content) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "failed to parse config, using defaults");
                    ApConfig::default()
                }
            },
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read config, using defaults");
                ApConfig::default()
            }
        }
    }

    /// Persists the config. Writes to a temp file in the same directory and
    /// renames it over the target so a concurrent reader never observes a
    /// partially written file.
    pub fn save(&self, config: &ApConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize config")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write config file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace config file: {}", self.path.display()))?;

        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}
