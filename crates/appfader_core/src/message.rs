//! Message Types for Worker Communication
//!
//! Commands flow from callers -> manager worker
//! Events flow from manager worker -> observers (the UI layer)

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// Commands sent from callers to the manager worker
#[derive(Debug, Clone)]
pub enum Command {
    /// Set an application's desired volume (clamped to 0.0 - 1.0).
    /// Applies to every bound player immediately and persists in the
    /// background.
    SetVolume { package: String, volume: f32 },

    /// Set an application's hidden flag. Persists in the background; has
    /// no player side effect.
    SetHidden { package: String, hidden: bool },

    /// Ask the privilege broker to prompt the user for the grant
    RequestPermission,

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Shutdown the manager worker
    Shutdown,
}

/// UI-facing view of one application entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    /// Package identity
    pub package: String,

    /// Display label (the package id when metadata lookup failed)
    pub name: String,

    /// Icon resource; `None` means the generic icon
    pub icon: Option<String>,

    /// Desired volume in [0.0, 1.0]
    pub volume: f32,

    /// Hidden from default listings
    pub hidden: bool,

    /// Number of currently bound players
    pub player_count: usize,
}

/// Events sent from the manager worker to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Broker availability or permission state changed
    SessionChanged { state: SessionState },

    /// The registry changed: new applications, rebound players, or
    /// preference values applied from the store
    AppsUpdated { apps: Vec<AppSnapshot> },

    /// A user-driven volume change was applied
    VolumeChanged { package: String, volume: f32 },

    /// A user-driven hidden-flag change was applied
    HiddenChanged { package: String, hidden: bool },

    /// Current state snapshot
    StateUpdate {
        session: SessionState,
        apps: Vec<AppSnapshot>,
    },

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PermissionState;

    #[test]
    fn test_event_serialization() {
        let event = Event::VolumeChanged {
            package: "com.example.app".to_string(),
            volume: 0.4,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("VolumeChanged"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        if let Event::VolumeChanged { package, volume } = deserialized {
            assert_eq!(package, "com.example.app");
            assert_eq!(volume, 0.4);
        } else {
            panic!("Deserialization produced wrong variant");
        }
    }

    #[test]
    fn test_error_event() {
        let event = Event::error("Test error message");
        if let Event::Error { message } = event {
            assert_eq!(message, "Test error message");
        } else {
            panic!("Should be Error variant");
        }
    }

    #[test]
    fn test_state_update_serialization() {
        let event = Event::StateUpdate {
            session: SessionState::BrokerReady(PermissionState::Granted),
            apps: vec![AppSnapshot {
                package: "com.example.app".to_string(),
                name: "Example".to_string(),
                icon: None,
                volume: 0.8,
                hidden: false,
                player_count: 2,
            }],
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        if let Event::StateUpdate { session, apps } = deserialized {
            assert!(session.permission_granted());
            assert_eq!(apps.len(), 1);
            assert_eq!(apps[0].player_count, 2);
        } else {
            panic!("Wrong variant");
        }
    }
}
