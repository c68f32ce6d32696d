//! Tail configuration.
//!
//! Configuration is read from TOML at `$CREATORGUARD_CONFIG` when set,
//! otherwise:
//! - Linux: `~/.config/creatorguard/tail.toml`
//! - Windows: `%APPDATA%/creatorguard/tail.toml`
//!
//! A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use creatorguard_protocol::MessageType;
use creatorguard_realtime::{
    ClientOptions, Filter, HeartbeatConfig, ReconnectConfig, SubscriptionConfig,
};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CREATORGUARD_CONFIG";

/// Environment variable overriding `auth_token`.
pub const TOKEN_ENV: &str = "CREATORGUARD_TOKEN";

/// Tail configuration. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Session-scoped event stream endpoint.
    pub endpoint: String,
    pub auth_token: Option<String>,
    pub max_reconnect_attempts: u32,
    /// Verbose logging, both for the filter default and per-frame diagnostics.
    pub debug: bool,
    pub announce_subscriptions: bool,
    pub recent_capacity: usize,

    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,

    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub handshake_timeout_ms: u64,

    /// How often a projection summary is logged. Zero disables it.
    pub summary_interval_ms: u64,

    pub subscriptions: Vec<SubscriptionEntry>,
}

/// One `[[subscriptions]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub id: String,
    pub types: Vec<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl SubscriptionEntry {
    pub fn to_config(&self) -> SubscriptionConfig {
        let config = SubscriptionConfig::new(self.types.iter().copied());
        match &self.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        let defaults = ClientOptions::new("ws://localhost:8000/ws/events");
        Self {
            endpoint: defaults.endpoint,
            auth_token: None,
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            debug: false,
            announce_subscriptions: defaults.announce_subscriptions,
            recent_capacity: defaults.recent_capacity,
            initial_delay_ms: millis(defaults.reconnect.initial_delay),
            max_delay_ms: millis(defaults.reconnect.max_delay),
            backoff_factor: defaults.reconnect.backoff_factor,
            jitter: defaults.reconnect.jitter,
            ping_interval_ms: millis(defaults.heartbeat.interval),
            pong_timeout_ms: millis(defaults.heartbeat.timeout),
            handshake_timeout_ms: millis(defaults.heartbeat.handshake_timeout),
            summary_interval_ms: 30_000,
            subscriptions: Vec::new(),
        }
    }
}

impl TailConfig {
    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<(Self, PathBuf)> {
        let path = config_path();
        let mut config = Self::load_from(&path)?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.auth_token = Some(token);
        }
        Ok((config, path))
    }

    /// Loads configuration from `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: TailConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("endpoint must not be empty");
        }
        if self.backoff_factor < 1.0 {
            anyhow::bail!("backoff_factor must be at least 1.0");
        }
        if self.ping_interval_ms == 0 {
            anyhow::bail!("ping_interval_ms must be greater than zero");
        }
        if self.handshake_timeout_ms == 0 {
            anyhow::bail!("handshake_timeout_ms must be greater than zero");
        }
        if self.pong_timeout_ms <= self.ping_interval_ms {
            anyhow::bail!("pong_timeout_ms must exceed ping_interval_ms");
        }
        for (i, sub) in self.subscriptions.iter().enumerate() {
            if sub.id.is_empty() {
                anyhow::bail!("subscription #{} has an empty id", i + 1);
            }
            if sub.types.is_empty() {
                anyhow::bail!("subscription {:?} lists no types", sub.id);
            }
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(self.endpoint.clone())
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
            .with_debug(self.debug);
        if let Some(token) = &self.auth_token {
            options = options.with_auth_token(token.clone());
        }
        options.announce_subscriptions = self.announce_subscriptions;
        options.recent_capacity = self.recent_capacity;
        options.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        };
        options.heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(self.ping_interval_ms),
            timeout: Duration::from_millis(self.pong_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        };
        options
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("creatorguard").join("tail.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("creatorguard")
            .join("tail.toml")
    }
}
