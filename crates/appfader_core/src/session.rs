//! Broker Session Tracking
//!
//! Tracks the privilege broker's availability and the permission grant as
//! observable state. All transitions are event-driven; a disconnected
//! broker is only noticed again through its own reconnect event.

use serde::{Deserialize, Serialize};

/// Permission grant state while the broker is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    /// Connected, grant state not yet determined by a user decision
    Unknown,
    /// The user granted the privilege
    Granted,
    /// The user denied the privilege; terminal until manually retried
    Denied,
}

/// Availability of the privileged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No broker event observed yet
    Uninitialized,
    /// Broker process not connected; privileged calls will fail
    WaitingForBroker,
    /// Broker connected; usability depends on the permission state
    BrokerReady(PermissionState),
}

impl SessionState {
    /// Whether privileged calls can be expected to succeed.
    pub fn permission_granted(&self) -> bool {
        matches!(self, SessionState::BrokerReady(PermissionState::Granted))
    }
}

/// State machine over broker lifecycle events.
pub struct SessionTracker {
    state: SessionState,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Broker connected; `permission_granted` is the immediately-queried
    /// grant state. Returns the new state if it changed.
    pub fn on_connected(&mut self, permission_granted: bool) -> Option<SessionState> {
        let next = if permission_granted {
            SessionState::BrokerReady(PermissionState::Granted)
        } else {
            SessionState::BrokerReady(PermissionState::Unknown)
        };
        self.advance(next)
    }

    /// Broker disconnected. Player handles and in-flight privileged calls
    /// are invalid from here on.
    pub fn on_disconnected(&mut self) -> Option<SessionState> {
        self.advance(SessionState::WaitingForBroker)
    }

    /// Outcome of an explicit permission request.
    pub fn on_permission_result(&mut self, granted: bool) -> Option<SessionState> {
        let next = if granted {
            SessionState::BrokerReady(PermissionState::Granted)
        } else {
            SessionState::BrokerReady(PermissionState::Denied)
        };
        self.advance(next)
    }

    fn advance(&mut self, next: SessionState) -> Option<SessionState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
