//! Operator console configuration.
//!
//! Settings come from a TOML file (`sysgate.toml`), then `SYSGATE_*`
//! environment variables, then command-line flags applied by the binary.
//! A missing or unreadable file is not fatal: defaults are used and a
//! warning is logged.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "sysgate.toml";
pub const CONFIG_ENV: &str = "SYSGATE_CONFIG";

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";
const DEFAULT_ROLE: &str = "KEEPER";
const DEFAULT_RESPONDED_BY: &str = "gatekeeper";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_OPERATOR: &str = "operator";
const DEFAULT_LOG_DB: &str = "sysgate-logs.db";
const DEFAULT_DNS_HOST: &str = "www.google.com";
const DEFAULT_PROBE_URL: &str = "https://clients3.google.com/generate_204";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SysgateConfig {
    pub gatekeeper: GatekeeperCfg,
    pub operator: OperatorCfg,
    pub logs: LogsCfg,
    pub network: NetworkCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperCfg {
    /// Base websocket URL; `/gatekeeper` is appended when connecting.
    pub ws_url: String,
    pub role: String,
    pub responded_by: String,
    pub reconnect_delay_secs: u64,
}

impl Default for GatekeeperCfg {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            role: DEFAULT_ROLE.to_string(),
            responded_by: DEFAULT_RESPONDED_BY.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

impl GatekeeperCfg {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorCfg {
    pub username: String,
    /// Session token; doubles as the socket `client_id`.
    pub auth_token: Option<String>,
}

impl Default for OperatorCfg {
    fn default() -> Self {
        Self {
            username: DEFAULT_OPERATOR.to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsCfg {
    pub path: PathBuf,
}

impl Default for LogsCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_DB),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCfg {
    pub dns_host: String,
    pub probe_url: String,
    pub probe_timeout_secs: u64,
    pub monitor_interval_secs: u64,
}

impl Default for NetworkCfg {
    fn default() -> Self {
        Self {
            dns_host: DEFAULT_DNS_HOST.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
        }
    }
}

impl NetworkCfg {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}

impl SysgateConfig {
    /// Applies `SYSGATE_WS_URL`, `SYSGATE_TOKEN`, `SYSGATE_OPERATOR` and
    /// `SYSGATE_LOG_DB` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup. Blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = get("SYSGATE_WS_URL") {
            self.gatekeeper.ws_url = url;
        }
        if let Some(token) = get("SYSGATE_TOKEN") {
            self.operator.auth_token = Some(token);
        }
        if let Some(username) = get("SYSGATE_OPERATOR") {
            self.operator.username = username;
        }
        if let Some(path) = get("SYSGATE_LOG_DB") {
            self.logs.path = PathBuf::from(path);
        }
    }
}

/// Picks the config file: explicit path, then `SYSGATE_CONFIG`, then
/// `./sysgate.toml` when it exists.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| {
            let candidate = std::env::current_dir().ok()?.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        })
}

pub fn load_config(config_path: Option<&Path>) -> SysgateConfig {
    let Some(path) = config_path else {
        debug!("No config file, using defaults");
        return SysgateConfig::default();
    };

    let contents = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(err) => {
            warn!("Failed to read config file {}: {}", path.display(), err);
            return SysgateConfig::default();
        }
    };

    match toml::from_str::<SysgateConfig>(&contents) {
        Ok(cfg) => {
            debug!("Loaded config from {}", path.display());
            cfg
        }
        Err(err) => {
            warn!("Failed to parse {}: {}", path.display(), err);
            SysgateConfig::default()
        }
    }
}
