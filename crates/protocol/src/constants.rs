use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often to send a keepalive ping while connected.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Read deadline: if *nothing* arrives within this window (no pong, no
/// frame), the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(45);

/// Upper bound on the WebSocket upgrade, from TCP connect to the 101 response.
pub const WS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Floor for the ping period; a zero period would spin the ping pump.
pub const WS_MIN_PING_PERIOD: Duration = Duration::from_millis(100);

/// Maximum inbound frame size in bytes (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Close code sent by the backend when the session credential is rejected
/// after the upgrade has completed.
pub const WS_CLOSE_UNAUTHORIZED: u16 = 4401;

/// Query parameter carrying the session credential on the upgrade request.
pub const AUTH_QUERY_PARAM: &str = "token";

/// Default number of consecutive failures tolerated before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default number of items retained per recent-items projection.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

/// Event stream message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Scan pipeline
    #[serde(rename = "scan_progress")]
    ScanProgress,
    #[serde(rename = "scan_complete")]
    ScanComplete,
    #[serde(rename = "detection_found")]
    DetectionFound,

    // Enforcement
    #[serde(rename = "takedown_update")]
    TakedownUpdate,

    // Notifications
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "admin_notification")]
    AdminNotification,
    #[serde(rename = "activity")]
    Activity,

    // Control
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "subscribe")]
    Subscribe,
    #[serde(rename = "unsubscribe")]
    Unsubscribe,
    #[serde(rename = "subscribed")]
    Subscribed,
    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::ScanProgress).unwrap(),
            "\"scan_progress\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::AdminNotification).unwrap(),
            "\"admin_notification\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"takedown_update\"").unwrap();
        assert_eq!(mt, MessageType::TakedownUpdate);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"billing_changed\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }

    #[test]
    fn heartbeat_deadline_exceeds_ping_period() {
        assert!(WS_PONG_WAIT > WS_PING_PERIOD);
    }
}
