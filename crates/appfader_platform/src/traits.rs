//! Platform Capability Traits
//!
//! Defines the interfaces the engine needs from the host platform: the
//! audio service (active playback sessions and their volume handles) and
//! process/package introspection. Concrete bindings (hidden system APIs,
//! reflection shims, or a test stub) live behind these traits.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Volume control for one live audio stream.
pub trait PlayerControl: Send + Sync {
    /// Push a volume in [0.0, 1.0] onto the underlying stream.
    fn set_volume(&self, volume: f32) -> Result<(), PlatformError>;
}

/// Platform descriptor of one currently active audio stream.
#[derive(Clone)]
pub struct PlaybackConfig {
    /// Process id of the stream's owner.
    pub pid: u32,

    /// Volume control handle. `None` when the platform withheld access to
    /// the underlying player; such configurations are skipped, not errored.
    pub player: Option<Arc<dyn PlayerControl>>,
}

impl fmt::Debug for PlaybackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackConfig")
            .field("pid", &self.pid)
            .field("has_player", &self.player.is_some())
            .finish()
    }
}

/// A running process as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID
    pub pid: u32,

    /// Full process name, e.g. "com.example.app:worker". The portion
    /// before the first `:` is the owning package.
    pub process_name: String,
}

/// Identifier of a device user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub u32);

/// Display metadata for an application package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Human-readable label
    pub label: String,

    /// Icon resource identifier; `None` means the generic icon
    pub icon: Option<String>,
}

pub type PlaybackListener = Box<dyn Fn(Vec<PlaybackConfig>) + Send + 'static>;

/// Platform audio service capability.
pub trait AudioSessionService: Send + Sync {
    /// Current list of active playback configurations.
    fn active_playback_configs(&self) -> Result<Vec<PlaybackConfig>, PlatformError>;

    /// Register for configuration-changed notifications. The listener
    /// receives the full new list on every change.
    fn register_playback_listener(&self, listener: PlaybackListener);
}

/// Process and package introspection capability.
pub trait ProcessDirectory: Send + Sync {
    /// Current running-process list. Requires the privileged path.
    fn running_processes(&self) -> Result<Vec<ProcessRecord>, PlatformError>;

    /// All device user profiles.
    fn user_profiles(&self) -> Vec<ProfileId>;

    /// Application metadata as seen by one user profile.
    ///
    /// A missing package yields [`PlatformError::PackageNotFound`], which
    /// callers treat as "try the next profile".
    fn application_info(
        &self,
        profile: ProfileId,
        package: &str,
    ) -> Result<AppMetadata, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_record_serialization() {
        let record = ProcessRecord {
            pid: 1234,
            process_name: "com.example.app:worker".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let deserialized: ProcessRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.pid, 1234);
        assert_eq!(deserialized.process_name, "com.example.app:worker");
    }

    #[test]
    fn test_playback_config_debug_hides_handle() {
        let config = PlaybackConfig {
            pid: 7,
            player: None,
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("has_player: false"));
    }
}
