//! Public types for the realtime connection manager.

use std::time::Duration;

use serde::Serialize;

use creatorguard_protocol::Message;
use creatorguard_protocol::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECENT_CAPACITY, WS_HANDSHAKE_TIMEOUT,
    WS_PING_PERIOD, WS_PONG_WAIT,
};

use crate::error::ClientError;

/// Lifecycle state of the single event-stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none pending.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Handshake complete, frames flowing.
    Connected,
    /// Connection lost, a retry is pending.
    Reconnecting { attempt: u32 },
    /// Automatic recovery gave up; needs an explicit connect.
    Failed,
}

impl ConnectionState {
    /// Whether a physical connection is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Whether the UI should show a degraded/offline indicator.
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Reconnecting { .. } | Self::Failed)
    }
}

/// Notifications emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The state machine moved between two states.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A non-fatal or terminal error was observed.
    Error(ClientError),
    /// A frame was decoded and dispatched.
    Message(Message),
    /// The handshake completed.
    Connected,
    /// The connection was closed on purpose.
    Disconnected,
    /// A retry has been scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// The retry budget is spent; the manager stays in `Failed`.
    MaxReconnectAttemptsReached { attempts: u32 },
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Spread each delay by ±25% so many dashboards don't retry in lockstep.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

/// Keepalive settings for a live connection.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often a ping is written.
    pub interval: Duration,
    /// Silence longer than this closes the connection as dead.
    pub timeout: Duration,
    /// An upgrade that hasn't completed within this window counts as a
    /// failed attempt.
    pub handshake_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: WS_PING_PERIOD,
            timeout: WS_PONG_WAIT,
            handshake_timeout: WS_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Construction options for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Session-scoped event stream endpoint (`ws://` or `wss://`).
    pub endpoint: String,
    /// Credential used on the first connect; rotate with `update_auth_token`.
    pub auth_token: Option<String>,
    /// Consecutive failures tolerated before entering `Failed`.
    pub max_reconnect_attempts: u32,
    /// Log every frame at debug level instead of trace.
    pub debug: bool,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    /// Send `subscribe`/`unsubscribe` control frames for server-side filtering.
    pub announce_subscriptions: bool,
    /// Items retained per recent-items projection.
    pub recent_capacity: usize,
}

impl ClientOptions {
    /// Options for the given endpoint with all other settings at defaults.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            debug: false,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            announce_subscriptions: false,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts.max(1);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
