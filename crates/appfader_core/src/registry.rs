//! Application Registry
//!
//! The authoritative mapping from package identity to display metadata,
//! desired volume, hidden flag, and the currently bound players. Entries
//! are created on first reference and live for the registry's lifetime.
//!
//! The registry is confined to the manager worker thread; that confinement
//! is what guarantees a single entry per package without locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use appfader_platform::{
    with_privileged, AppMetadata, PlaybackConfig, PlayerControl, ProcessDirectory,
};

use crate::message::AppSnapshot;

/// One live audio stream bound to an application.
///
/// Valid only until the next playback-configuration change; never
/// persisted.
pub struct PlayerBinding {
    /// The platform descriptor this binding was made from
    pub config: PlaybackConfig,

    /// Volume control for the underlying stream
    pub player: Arc<dyn PlayerControl>,
}

/// Per-application state.
pub struct AppEntry {
    /// Package identity, unique within the registry
    pub package: String,

    /// Display label; the package id when metadata lookup failed
    pub name: String,

    /// Icon resource; `None` is the generic icon
    pub icon: Option<String>,

    /// Desired volume in [0.0, 1.0]
    pub volume: f32,

    /// Hidden from default listings
    pub hidden: bool,

    /// Bound players, cleared and rebuilt on every playback change
    pub players: Vec<PlayerBinding>,
}

impl AppEntry {
    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            package: self.package.clone(),
            name: self.name.clone(),
            icon: self.icon.clone(),
            volume: self.volume,
            hidden: self.hidden,
            player_count: self.players.len(),
        }
    }
}

/// Mapping from package identity to [`AppEntry`].
pub struct AppRegistry {
    directory: Arc<dyn ProcessDirectory>,
    default_volume: f32,
    apps: HashMap<String, AppEntry>,
}

impl AppRegistry {
    pub fn new(directory: Arc<dyn ProcessDirectory>, default_volume: f32) -> Self {
        Self {
            directory,
            default_volume,
            apps: HashMap::new(),
        }
    }

    /// Return the existing entry for `package`, or construct one.
    ///
    /// Construction looks the package up as every user profile in turn;
    /// the first successful lookup wins. When every profile misses (or the
    /// lookup cannot be made at all), the entry falls back to the package
    /// id as its label and the generic icon. Never fails.
    pub fn get_or_create(&mut self, package: &str) -> &mut AppEntry {
        let directory = &self.directory;
        let default_volume = self.default_volume;
        self.apps
            .entry(package.to_string())
            .or_insert_with(|| Self::create_entry(directory, default_volume, package))
    }

    fn create_entry(
        directory: &Arc<dyn ProcessDirectory>,
        default_volume: f32,
        package: &str,
    ) -> AppEntry {
        // Cross-profile metadata lookup needs the elevated path.
        let metadata = with_privileged(|| {
            for profile in directory.user_profiles() {
                match directory.application_info(profile, package) {
                    Ok(metadata) => {
                        debug!(
                            "Found app info for {} in profile {:?}",
                            package, profile
                        );
                        return Some(metadata);
                    }
                    Err(_) => continue, // try next profile
                }
            }
            None
        });

        match metadata {
            Some(AppMetadata { label, icon }) => AppEntry {
                package: package.to_string(),
                name: label,
                icon,
                volume: default_volume,
                hidden: false,
                players: Vec::new(),
            },
            None => {
                debug!("No app info for {} in any profile, using placeholder", package);
                AppEntry {
                    package: package.to_string(),
                    name: package.to_string(),
                    icon: None,
                    volume: default_volume,
                    hidden: false,
                    players: Vec::new(),
                }
            }
        }
    }

    pub fn get(&self, package: &str) -> Option<&AppEntry> {
        self.apps.get(package)
    }

    /// Drop every entry's player bindings. Run before each rebuild so no
    /// stale handle survives a playback-configuration change.
    pub fn clear_players(&mut self) {
        for entry in self.apps.values_mut() {
            entry.players.clear();
        }
    }

    /// UI-facing snapshots, ordered by package for stable listings.
    pub fn snapshots(&self) -> Vec<AppSnapshot> {
        let mut apps: Vec<AppSnapshot> = self.apps.values().map(AppEntry::snapshot).collect();
        apps.sort_by(|a, b| a.package.cmp(&b.package));
        apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfader_platform::{ProfileId, StubPlatform};

    fn connected_platform() -> StubPlatform {
        let platform = StubPlatform::new();
        platform.broker().connect();
        platform
    }

    #[test]
    fn test_metadata_lookup_first_profile_wins() {
        let platform = connected_platform();
        platform.add_profile(ProfileId(10));
        platform.register_app(
            ProfileId(0),
            "com.example.app",
            AppMetadata {
                label: "Primary".to_string(),
                icon: Some("icon://primary".to_string()),
            },
        );
        platform.register_app(
            ProfileId(10),
            "com.example.app",
            AppMetadata {
                label: "Work Profile".to_string(),
                icon: None,
            },
        );

        let mut registry = AppRegistry::new(platform.directory(), 1.0);
        let entry = registry.get_or_create("com.example.app");

        assert_eq!(entry.name, "Primary");
        assert_eq!(entry.icon.as_deref(), Some("icon://primary"));
    }

    #[test]
    fn test_lookup_falls_through_to_other_profiles() {
        let platform = connected_platform();
        platform.add_profile(ProfileId(10));
        platform.register_app(
            ProfileId(10),
            "com.example.app",
            AppMetadata {
                label: "Work Profile".to_string(),
                icon: None,
            },
        );

        let mut registry = AppRegistry::new(platform.directory(), 1.0);
        let entry = registry.get_or_create("com.example.app");

        assert_eq!(entry.name, "Work Profile");
    }

    #[test]
    fn test_placeholder_when_all_profiles_miss() {
        let platform = connected_platform();
        let mut registry = AppRegistry::new(platform.directory(), 1.0);

        let entry = registry.get_or_create("com.unknown.app");

        assert_eq!(entry.name, "com.unknown.app");
        assert!(entry.icon.is_none());
        assert_eq!(entry.volume, 1.0);
        assert!(!entry.hidden);
    }

    #[test]
    fn test_placeholder_when_broker_disconnected() {
        // Lookup failures from a dead broker degrade to the placeholder,
        // never to an error.
        let platform = StubPlatform::new();
        platform.register_app(
            ProfileId(0),
            "com.example.app",
            AppMetadata {
                label: "Example".to_string(),
                icon: None,
            },
        );

        let mut registry = AppRegistry::new(platform.directory(), 1.0);
        let entry = registry.get_or_create("com.example.app");

        assert_eq!(entry.name, "com.example.app");
    }

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let platform = connected_platform();
        let mut registry = AppRegistry::new(platform.directory(), 1.0);

        registry.get_or_create("com.example.app").volume = 0.25;
        let entry = registry.get_or_create("com.example.app");

        // The first construction is retained, not replaced.
        assert_eq!(entry.volume, 0.25);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_players() {
        let platform = connected_platform();
        let player = platform.add_playback(42, true).unwrap();

        let mut registry = AppRegistry::new(platform.directory(), 1.0);
        let entry = registry.get_or_create("com.example.app");
        entry.players.push(PlayerBinding {
            config: PlaybackConfig {
                pid: 42,
                player: Some(player.clone() as Arc<dyn PlayerControl>),
            },
            player: player as Arc<dyn PlayerControl>,
        });

        registry.clear_players();
        assert_eq!(registry.get("com.example.app").unwrap().players.len(), 0);
    }

    #[test]
    fn test_snapshots_are_sorted() {
        let platform = connected_platform();
        let mut registry = AppRegistry::new(platform.directory(), 1.0);
        registry.get_or_create("com.zebra.app");
        registry.get_or_create("com.alpha.app");

        let snapshots = registry.snapshots();
        assert_eq!(snapshots[0].package, "com.alpha.app");
        assert_eq!(snapshots[1].package, "com.zebra.app");
    }
}
