//! Connection lifecycle state machine.
//!
//! The machine only knows which transitions are legal; the manager decides
//! when to request them.

use crate::types::ConnectionState;

/// A rejected transition request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Returns whether `from -> to` is in the transition table.
///
/// `Connecting -> Failed` and `Connected -> Failed` cover a rejected
/// credential, which never goes through `Reconnecting`. `Reconnecting -> Reconnecting` only allows the
/// attempt counter to move forward.
pub fn is_allowed(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        (Disconnected, Connecting) => true,
        (Connecting, Connected | Disconnected | Failed | Reconnecting { .. }) => true,
        (Connected, Disconnected | Failed | Reconnecting { .. }) => true,
        (Reconnecting { attempt: a }, Reconnecting { attempt: b }) => b > a,
        (Reconnecting { .. }, Connecting | Disconnected | Failed) => true,
        (Failed, Connecting | Disconnected) => true,
        _ => false,
    }
}

/// Holds the current state and enforces the transition table.
#[derive(Debug)]
pub struct StateMachine {
    current: ConnectionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: ConnectionState::Disconnected,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Moves to `to`, returning the previous state.
    pub fn transition(&mut self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        let from = self.current;
        if !is_allowed(from, to) {
            return Err(InvalidTransition { from, to });
        }
        self.current = to;
        Ok(from)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
