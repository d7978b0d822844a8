use crate::error::{BridgeError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Poll period used when the config does not name one.
pub const DEFAULT_INTERVAL_SECS: u64 = 6;

/// Delay before the one-shot identity fetch after the accessory starts.
pub const DEFAULT_IDENTITY_DELAY_MS: u64 = 500;

const CONFIG_DIR: &str = "panda-pwr-bridge";
const CONFIG_FILE: &str = "config.json";
const CACHE_FILE: &str = "accessories.json";

/// Load `KEY=value` pairs from a `.env` file into the process environment.
///
/// Values may contain spaces without quoting; surrounding quotes are stripped.
/// Variables already present in the environment win. Returns how many keys
/// were applied.
pub fn load_dotenv(path: impl AsRef<Path>) -> usize {
    let Ok(content) = fs::read_to_string(path.as_ref()) else {
        return 0;
    };

    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the tokio runtime spawns any worker threads
            unsafe { std::env::set_var(key, value) };
            applied += 1;
        }
    }
    applied
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim(), unquoted))
        })
        .collect()
}

/// Platform configuration for a single PandaPWR device.
///
/// Field names on disk match the plugin's config block, so an existing
/// `{"platform": "PandaPwr", "panda-pwr-ip": "...", "interval": 6}` entry can
/// be reused as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub platform: String,
    pub name: String,
    #[serde(rename = "panda-pwr-ip")]
    pub ip: String,
    #[serde(rename = "interval")]
    pub interval_secs: u64,
    #[serde(rename = "identityDelayMs")]
    pub identity_delay_ms: u64,
    /// Per-request timeout. `None` leaves the transport default in place.
    #[serde(rename = "requestTimeoutSecs", skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(rename = "cachePath", skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: "PandaPwr".to_string(),
            name: "pandaPwr".to_string(),
            ip: String::new(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            identity_delay_ms: DEFAULT_IDENTITY_DELAY_MS,
            request_timeout_secs: None,
            cache_path: None,
        }
    }
}

impl Config {
    /// Read a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let config = serde_json::from_slice::<Config>(&bytes)?;
                info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from file, then layer the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `PANDA_PWR_*` overrides from the given lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ip) = lookup("PANDA_PWR_IP") {
            self.ip = ip;
        }
        if let Some(interval) = lookup("PANDA_PWR_INTERVAL")
            && let Ok(secs) = interval.parse()
        {
            self.interval_secs = secs;
        }
        if let Some(name) = lookup("PANDA_PWR_NAME") {
            self.name = name;
        }
        if let Some(timeout) = lookup("PANDA_PWR_TIMEOUT")
            && let Ok(secs) = timeout.parse()
        {
            self.request_timeout_secs = Some(secs);
        }
        if let Some(path) = lookup("PANDA_PWR_CACHE") {
            self.cache_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "device address (panda-pwr-ip) is required".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "interval must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(BridgeError::InvalidConfig(
                "requestTimeoutSecs must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the accessory cache lives for this configuration.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(default_cache_path)
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

pub fn default_cache_path() -> PathBuf {
    config_dir().join(CACHE_FILE)
}
