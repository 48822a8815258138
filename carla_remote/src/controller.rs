//! Connection status state machine.

use serde::Serialize;
use std::fmt;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => f.write_str("idle"),
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Inputs to the state machine, from the caller or the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Connect,
    Disconnect,
    Opened,
    Closed,
    Failed(String),
    HostExit,
    HostExitError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

/// What the owner must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Step {
    pub change: Option<StatusChange>,
    /// Request the full patchbay state; set exactly once per successful open.
    pub refresh: bool,
    /// Status left `Connected`: pending mutations and cached entities are stale.
    pub invalidate: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionController {
    status: ConnectionStatus,
}

impl ConnectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn handle(&mut self, signal: Signal) -> Step {
        use ConnectionStatus as S;

        let next = match (&self.status, signal) {
            (_, Signal::Connect) => Some(S::Connecting),
            (_, Signal::Disconnect) => Some(S::Disconnected),
            (S::Connecting, Signal::Opened) => Some(S::Connected),
            (S::Connecting | S::Connected, Signal::Closed | Signal::HostExit) => {
                Some(S::Disconnected)
            }
            (S::Connecting | S::Connected, Signal::Failed(reason)) => Some(S::Error(reason)),
            (_, Signal::HostExitError(reason)) => Some(S::Error(reason)),
            // Late transport events after a disconnect or error change nothing.
            _ => None,
        };

        let Some(next) = next else {
            return Step::default();
        };
        if next == self.status {
            return Step::default();
        }

        let from = std::mem::replace(&mut self.status, next.clone());
        Step {
            refresh: next.is_connected(),
            invalidate: from.is_connected(),
            change: Some(StatusChange { from, to: next }),
        }
    }
}
