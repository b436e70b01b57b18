// crates/babel-daemon/src/config.rs
//
// Runtime configuration for the Babel daemon.
// Loaded from a TOML file or populated with sensible defaults.

use std::fs;
use std::time::Duration;

use babel_consensus::{BatchConfig, ManagerConfig};
use babel_hub::{HubConfig, DEFAULT_COMMAND_BUFFER};
use serde::Deserialize;

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Host address for the WebSocket gateway.
    #[serde(default = "default_ws_host")]
    pub ws_host: String,

    /// Port for the WebSocket gateway.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Base URL of the content analysis service.
    #[serde(default = "default_analysis_url")]
    pub analysis_url: String,

    /// Upper bound on one analysis call, in seconds.
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_timeout_secs: u64,

    /// Minimum time between two activity analyses of one user, in seconds.
    #[serde(default = "default_user_refresh_secs")]
    pub user_refresh_secs: u64,

    /// Score cache TTL, in seconds. Also the sweep interval.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Flush a batch once nothing has been enqueued for this long.
    #[serde(default = "default_batch_quiescence_ms")]
    pub batch_quiescence_ms: u64,

    /// Flush a batch no later than this long after its first item.
    #[serde(default = "default_batch_max_delay_ms")]
    pub batch_max_delay_ms: u64,

    /// Flush a batch as soon as it holds this many items.
    #[serde(default = "default_batch_max_items")]
    pub batch_max_items: usize,

    /// Outbound messages buffered per subscriber before it is disconnected.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ws_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ws_port() -> u16 {
    8080
}

fn default_analysis_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    30
}

fn default_user_refresh_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_batch_quiescence_ms() -> u64 {
    5_000
}

fn default_batch_max_delay_ms() -> u64 {
    30_000
}

fn default_batch_max_items() -> usize {
    256
}

fn default_client_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ws_host: default_ws_host(),
            ws_port: default_ws_port(),
            analysis_url: default_analysis_url(),
            analysis_timeout_secs: default_analysis_timeout_secs(),
            user_refresh_secs: default_user_refresh_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_quiescence_ms: default_batch_quiescence_ms(),
            batch_max_delay_ms: default_batch_max_delay_ms(),
            batch_max_items: default_batch_max_items(),
            client_buffer: default_client_buffer(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            batch: BatchConfig {
                quiescence: Duration::from_millis(self.batch_quiescence_ms),
                max_delay: Duration::from_millis(self.batch_max_delay_ms),
                max_items: self.batch_max_items.max(1),
            },
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            analysis_timeout: self.analysis_timeout(),
            user_refresh_interval: Duration::from_secs(self.user_refresh_secs),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            client_buffer: self.client_buffer,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}
