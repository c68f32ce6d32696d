//! Connection counters and last-known error.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ConnectionState;

/// Point-in-time summary of the connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub last_error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Mutable owner of the counters; only the manager writes to it.
#[derive(Debug)]
pub struct HealthTracker {
    health: ConnectionHealth,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            health: ConnectionHealth {
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
                messages_received: 0,
                messages_sent: 0,
                last_error: None,
                last_connected_at: None,
                last_message_at: None,
            },
        }
    }

    /// Returns an owned snapshot; later updates don't affect it.
    pub fn snapshot(&self) -> ConnectionHealth {
        self.health.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.health.reconnect_attempts
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.health.state = state;
    }

    pub(crate) fn record_connected(&mut self) {
        self.health.reconnect_attempts = 0;
        self.health.last_connected_at = Some(Utc::now());
    }

    /// Bumps the attempt counter and returns the new value.
    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.health.reconnect_attempts = self.health.reconnect_attempts.saturating_add(1);
        self.health.reconnect_attempts
    }

    pub(crate) fn reset_attempts(&mut self) {
        self.health.reconnect_attempts = 0;
    }

    pub(crate) fn record_received(&mut self) {
        self.health.messages_received += 1;
        self.health.last_message_at = Some(Utc::now());
    }

    pub(crate) fn record_sent(&mut self) {
        self.health.messages_sent += 1;
    }

    pub(crate) fn record_error(&mut self, error: impl ToString) {
        self.health.last_error = Some(error.to_string());
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
