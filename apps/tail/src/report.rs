//! Log output for notifications and projection summaries.

use std::time::Duration;

use tracing::{debug, info, warn};

use creatorguard_realtime::{
    ConnectionEvent, ConnectionHealth, Connector, ConnectionManager, Feed,
};

/// Logs one manager notification at a level matching its severity.
pub fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::StateChanged { from, to } => {
            debug!(?from, ?to, "state changed");
        }
        ConnectionEvent::Connected => info!("connected to event stream"),
        ConnectionEvent::Disconnected => info!("disconnected from event stream"),
        ConnectionEvent::Reconnecting { attempt, delay } => {
            info!(attempt, delay_ms = millis(*delay), "reconnecting");
        }
        ConnectionEvent::MaxReconnectAttemptsReached { attempts } => {
            warn!(attempts, "giving up on the event stream");
        }
        ConnectionEvent::Error(error) if error.is_terminal() => {
            warn!(%error, "connection needs attention");
        }
        ConnectionEvent::Error(error) => debug!(%error, "recoverable error"),
        ConnectionEvent::Message(message) => {
            debug!(msg_type = ?message.msg_type, seq = ?message.seq, "message");
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Renders the health snapshot as one JSON line.
pub fn health_line(health: &ConnectionHealth) -> String {
    serde_json::to_string(health).unwrap_or_else(|e| format!("<unserializable health: {e}>"))
}

/// Logs counters and projection sizes.
pub fn log_summary<C: Connector>(manager: &ConnectionManager<C>) {
    let projections = manager.projections();
    info!(
        health = %health_line(&manager.health()),
        scans = projections.scans().len(),
        takedowns = projections.takedowns().len(),
        detections = projections.feed(Feed::Detections).len(),
        notifications = projections.feed(Feed::Notifications).len(),
        activity = projections.feed(Feed::Activity).len(),
        "summary"
    );
}
