//! Playback Session Mapping
//!
//! Resolves each active playback configuration to its owning application
//! and rebinds the per-application player lists. The caller clears every
//! binding first and hands in the full configuration list; nothing here is
//! diffed incrementally.

use tracing::{debug, warn};

use appfader_platform::{PlaybackConfig, ProcessRecord};

use crate::registry::{AppRegistry, PlayerBinding};

/// Extract the package identity from a full process name.
///
/// A process can be a named sub-process ("com.example.app:worker"); only
/// the portion before the first `:` identifies the application.
pub fn package_of_process(process_name: &str) -> &str {
    process_name.split(':').next().unwrap_or(process_name)
}

/// Bind `configs` onto the registry.
///
/// Configurations without a player handle and configurations whose pid has
/// no running-process match are skipped. Each binding receives the entry's
/// current desired volume immediately, so a freshly observed player matches
/// the stored preference without waiting for another trigger. Returns the
/// number of bindings made.
pub fn bind_playback_configs(
    registry: &mut AppRegistry,
    processes: &[ProcessRecord],
    configs: Vec<PlaybackConfig>,
) -> usize {
    let mut bound = 0;

    for config in configs {
        let Some(player) = config.player.clone() else {
            debug!("Playback config for pid {} has no player handle, skipping", config.pid);
            continue;
        };

        let Some(process) = processes.iter().find(|p| p.pid == config.pid) else {
            debug!("No running process matches pid {}, skipping", config.pid);
            continue;
        };

        let package = package_of_process(&process.process_name);
        let entry = registry.get_or_create(package);

        if let Err(e) = player.set_volume(entry.volume) {
            warn!(
                "Failed to apply volume {:.2} to a player of {}: {}",
                entry.volume, entry.package, e
            );
        }

        entry.players.push(PlayerBinding { config, player });
        bound += 1;
    }

    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfader_platform::StubPlatform;

    fn process(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            process_name: name.to_string(),
        }
    }

    fn registry(platform: &StubPlatform) -> AppRegistry {
        AppRegistry::new(platform.directory(), 1.0)
    }

    #[test]
    fn test_binds_player_and_pushes_volume() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        let player = platform.add_playback(42, true).unwrap();
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        registry.get_or_create("com.example.app").volume = 0.3;

        let bound = bind_playback_configs(
            &mut registry,
            &[process(42, "com.example.app")],
            configs,
        );

        assert_eq!(bound, 1);
        assert_eq!(registry.get("com.example.app").unwrap().players.len(), 1);
        // The persisted volume, pushed exactly once.
        assert_eq!(player.pushed_volumes(), vec![0.3]);
    }

    #[test]
    fn test_subprocess_name_maps_to_package() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        platform.add_playback(42, true);
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        bind_playback_configs(
            &mut registry,
            &[process(42, "com.example.app:worker")],
            configs,
        );

        assert!(registry.get("com.example.app").is_some());
        assert!(registry.get("com.example.app:worker").is_none());
    }

    #[test]
    fn test_skips_config_without_player_handle() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        platform.add_playback(42, false);
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        let bound = bind_playback_configs(
            &mut registry,
            &[process(42, "com.example.app")],
            configs,
        );

        assert_eq!(bound, 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_skips_config_without_process_match() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        platform.add_playback(42, true);
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        let bound = bind_playback_configs(&mut registry, &[process(7, "com.other.app")], configs);

        assert_eq!(bound, 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failing_player_does_not_abort_siblings() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        let broken = platform.add_playback(42, true).unwrap();
        broken.set_failing(true);
        let healthy = platform.add_playback(43, true).unwrap();
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        let bound = bind_playback_configs(
            &mut registry,
            &[
                process(42, "com.example.app"),
                process(43, "com.other.app"),
            ],
            configs,
        );

        // The failed push is logged and skipped; both configs still bind.
        assert_eq!(bound, 2);
        assert_eq!(healthy.pushed_volumes(), vec![1.0]);
    }

    #[test]
    fn test_package_of_process() {
        assert_eq!(package_of_process("com.example.app"), "com.example.app");
        assert_eq!(
            package_of_process("com.example.app:worker"),
            "com.example.app"
        );
        assert_eq!(
            package_of_process("com.example.app:push:extra"),
            "com.example.app"
        );
    }

    #[test]
    fn test_multiple_streams_same_app_accumulate() {
        let platform = StubPlatform::new();
        platform.broker().connect();
        platform.add_playback(42, true);
        platform.add_playback(42, true);
        let configs = platform.audio().active_playback_configs().unwrap();

        let mut registry = registry(&platform);
        let bound = bind_playback_configs(
            &mut registry,
            &[process(42, "com.example.app")],
            configs,
        );

        assert_eq!(bound, 2);
        assert_eq!(registry.get("com.example.app").unwrap().players.len(), 2);
    }
}
