//! Error taxonomy surfaced to callers through notifications.

use creatorguard_protocol::FrameError;

use crate::ws_client::WsError;

/// Client-visible error categories.
///
/// Transport and protocol errors are informational: the manager recovers from
/// them on its own. Auth and retries-exhausted errors need caller action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ClientError {
    /// Whether the error requires the caller to act before reconnecting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::RetriesExhausted { .. })
    }
}

impl From<&WsError> for ClientError {
    fn from(err: &WsError) -> Self {
        match err {
            WsError::Unauthorized(_) => Self::Auth(err.to_string()),
            _ => Self::Transport(err.to_string()),
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        Self::Protocol(err.to_string())
    }
}
