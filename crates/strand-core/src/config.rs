//! Configuration parsing for the strand clients.
//!
//! Both binaries read their settings from a single JSON config file. Every
//! field has a default, so an empty object (or no file at all) yields a
//! usable configuration pointing at the production endpoints.
//!
//! # Example config
//!
//! ```json
//! {
//!   "api_key": "AK...",
//!   "secret_key": "SK...",
//!   "trade_url": "wss://trade.strand.example/v1",
//!   "reconnect": { "initial_backoff_ms": 100, "max_backoff_ms": 30000 },
//!   "request_timeout_secs": 10
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "STRAND_CONFIG";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service API key.
    #[serde(default)]
    pub api_key: String,

    /// Service API secret (HMAC-SHA256 signing of the auth nonce).
    #[serde(default)]
    pub secret_key: String,

    /// Trading session WebSocket URL.
    #[serde(default = "default_trade_url")]
    pub trade_url: String,

    /// Market stream WebSocket URL.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Reconnect policy of the transport.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Keep-alive ping interval in seconds (0 disables pings).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// How long a trading request may wait for its response.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            trade_url: default_trade_url(),
            stream_url: default_stream_url(),
            reconnect: ReconnectConfig::default(),
            ping_interval_secs: default_ping_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AppConfig {
    /// Keep-alive ping interval, `None` when disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// Per-request response timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Transport reconnect policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect after a dropped link.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First backoff delay in milliseconds; doubled after every failure.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_trade_url() -> String {
    "wss://trade.strand.example/v1".into()
}

fn default_stream_url() -> String {
    "wss://stream.strand.example/markets".into()
}

fn default_ping_interval() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    30_000
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// The process-wide default config location.
///
/// `$STRAND_CONFIG` wins; otherwise `<config dir>/strand/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(p));
    }
    dirs::config_dir().map(|d| d.join("strand").join("config.json"))
}

/// Load the explicitly requested config, or fall back to the default location.
///
/// An explicit path must exist. A missing default file is not an error and
/// yields [`AppConfig::default`].
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = path {
        return load_config(path);
    }
    match default_config_path() {
        Some(p) if p.is_file() => load_config(&p),
        other => {
            debug!("no config file at {other:?}, using built-in defaults");
            Ok(AppConfig::default())
        }
    }
}
