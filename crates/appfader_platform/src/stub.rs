//! In-Memory Stub Backend
//!
//! A scriptable stand-in for the real platform, used by engine tests and
//! headless runs. The stub keeps the privileged-routing rules honest: the
//! world state sits behind a [`RemoteTransport`] endpoint that refuses
//! privileged-only calls arriving on the normal path, and the broker's
//! channel refuses every call while disconnected. Calls are encoded as
//! JSON, standing in for the platform's native parcel format.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::{BrokerEvent, BrokerListener, PrivilegeBroker};
use crate::error::PlatformError;
use crate::traits::{
    AppMetadata, AudioSessionService, PlaybackConfig, PlaybackListener, PlayerControl,
    ProcessDirectory, ProcessRecord, ProfileId,
};
use crate::transport::{RemoteTransport, RoutedTransport};

/// Call codes understood by the stub endpoint.
pub const CALL_RUNNING_PROCESSES: u32 = 1;
pub const CALL_ACTIVE_PLAYBACK: u32 = 2;
pub const CALL_APPLICATION_INFO: u32 = 3;

/// Serializable playback descriptor carried over the stub transport.
///
/// The player handle itself is resolved out-of-band from the player table,
/// mirroring how the real platform hands out live proxy objects rather
/// than serialized ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlaybackDescriptor {
    pid: u32,
    player_id: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InfoRequest {
    profile: u32,
    package: String,
}

/// Recording volume-control handle.
pub struct StubPlayer {
    label: String,
    pushed: Mutex<Vec<f32>>,
    failing: AtomicBool,
}

impl StubPlayer {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            pushed: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    /// Every volume this handle has received, in order.
    pub fn pushed_volumes(&self) -> Vec<f32> {
        self.pushed.lock().clone()
    }

    /// Make subsequent `set_volume` calls fail, as a released player would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PlayerControl for StubPlayer {
    fn set_volume(&self, volume: f32) -> Result<(), PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::PlayerGone(self.label.clone()));
        }
        self.pushed.lock().push(volume);
        Ok(())
    }
}

#[derive(Default)]
struct BrokerState {
    connected: bool,
    permission: bool,
    grant_on_request: bool,
}

/// Scriptable privilege broker.
pub struct StubBroker {
    state: Arc<Mutex<BrokerState>>,
    listeners: Mutex<Vec<BrokerListener>>,
}

impl StubBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Bring the broker connection up.
    pub fn connect(&self) {
        self.state.lock().connected = true;
        self.notify(BrokerEvent::Connected);
    }

    /// Drop the broker connection.
    pub fn disconnect(&self) {
        self.state.lock().connected = false;
        self.notify(BrokerEvent::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Pre-set the permission state (as if granted in a previous session).
    pub fn set_permission(&self, granted: bool) {
        self.state.lock().permission = granted;
    }

    /// Choose the answer the "user" gives to the next permission request.
    pub fn set_grant_on_request(&self, grant: bool) {
        self.state.lock().grant_on_request = grant;
    }

    fn notify(&self, event: BrokerEvent) {
        for listener in self.listeners.lock().iter() {
            listener(event);
        }
    }
}

impl PrivilegeBroker for StubBroker {
    fn subscribe(&self, listener: BrokerListener) {
        let connected = self.state.lock().connected;
        if connected {
            listener(BrokerEvent::Connected);
        }
        self.listeners.lock().push(listener);
    }

    fn check_permission(&self) -> bool {
        self.state.lock().permission
    }

    fn request_permission(&self) {
        let granted = {
            let mut state = self.state.lock();
            state.permission = state.grant_on_request;
            state.permission
        };
        debug!("stub broker permission request -> granted={}", granted);
        self.notify(BrokerEvent::PermissionResult(granted));
    }

    fn wrap_call(&self, raw: Arc<dyn RemoteTransport>) -> Arc<dyn RemoteTransport> {
        Arc::new(BrokerChannel {
            state: Arc::clone(&self.state),
            raw,
        })
    }
}

/// The broker's privileged channel around a raw endpoint.
///
/// Checks the connection per call, like a real broker binder would, and
/// marks forwarded calls as privileged.
struct BrokerChannel {
    state: Arc<Mutex<BrokerState>>,
    raw: Arc<dyn RemoteTransport>,
}

impl RemoteTransport for BrokerChannel {
    fn transact(&self, code: u32, payload: &[u8]) -> Result<Vec<u8>, PlatformError> {
        if !self.state.lock().connected {
            return Err(PlatformError::BrokerUnavailable);
        }

        if let Some(endpoint) = self.raw.as_any().downcast_ref::<StubEndpoint>() {
            endpoint.dispatch(code, payload, true)
        } else {
            self.raw.transact(code, payload)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// World state served over the stub transport.
#[derive(Default)]
struct WorldData {
    processes: Vec<ProcessRecord>,
    playback: Vec<PlaybackDescriptor>,
    profiles: Vec<ProfileId>,
    apps: HashMap<(ProfileId, String), AppMetadata>,
}

/// Raw service endpoint over the world state.
///
/// Dispatch knows which path a call arrived on; privileged-only calls on
/// the normal path fail the way the platform's permission check would.
struct StubEndpoint {
    world: Arc<Mutex<WorldData>>,
}

impl StubEndpoint {
    fn dispatch(
        &self,
        code: u32,
        payload: &[u8],
        privileged: bool,
    ) -> Result<Vec<u8>, PlatformError> {
        match code {
            CALL_RUNNING_PROCESSES => {
                if !privileged {
                    return Err(PlatformError::PermissionDenied(
                        "running-process list requires the privileged path".into(),
                    ));
                }
                let world = self.world.lock();
                Ok(serde_json::to_vec(&world.processes)?)
            }
            CALL_ACTIVE_PLAYBACK => {
                let world = self.world.lock();
                Ok(serde_json::to_vec(&world.playback)?)
            }
            CALL_APPLICATION_INFO => {
                if !privileged {
                    return Err(PlatformError::PermissionDenied(
                        "cross-profile application info requires the privileged path".into(),
                    ));
                }
                let request: InfoRequest = serde_json::from_slice(payload)?;
                let world = self.world.lock();
                let metadata = world
                    .apps
                    .get(&(ProfileId(request.profile), request.package.clone()))
                    .cloned()
                    .ok_or(PlatformError::PackageNotFound(request.package))?;
                Ok(serde_json::to_vec(&metadata)?)
            }
            other => Err(PlatformError::UnknownCall(other)),
        }
    }
}

impl RemoteTransport for StubEndpoint {
    fn transact(&self, code: u32, payload: &[u8]) -> Result<Vec<u8>, PlatformError> {
        self.dispatch(code, payload, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Stub audio service speaking over the routed transport.
pub struct StubAudioService {
    transport: Arc<dyn RemoteTransport>,
    players: Arc<Mutex<HashMap<u32, Arc<StubPlayer>>>>,
    listeners: Mutex<Vec<PlaybackListener>>,
}

impl StubAudioService {
    fn resolve(&self, descriptors: Vec<PlaybackDescriptor>) -> Vec<PlaybackConfig> {
        let players = self.players.lock();
        descriptors
            .into_iter()
            .map(|descriptor| PlaybackConfig {
                pid: descriptor.pid,
                player: descriptor
                    .player_id
                    .and_then(|id| players.get(&id).cloned())
                    .map(|player| player as Arc<dyn PlayerControl>),
            })
            .collect()
    }
}

impl AudioSessionService for StubAudioService {
    fn active_playback_configs(&self) -> Result<Vec<PlaybackConfig>, PlatformError> {
        let bytes = self.transport.transact(CALL_ACTIVE_PLAYBACK, &[])?;
        let descriptors: Vec<PlaybackDescriptor> = serde_json::from_slice(&bytes)?;
        Ok(self.resolve(descriptors))
    }

    fn register_playback_listener(&self, listener: PlaybackListener) {
        self.listeners.lock().push(listener);
    }
}

/// Stub process/package directory speaking over the routed transport.
pub struct StubProcessDirectory {
    transport: Arc<dyn RemoteTransport>,
    world: Arc<Mutex<WorldData>>,
}

impl ProcessDirectory for StubProcessDirectory {
    fn running_processes(&self) -> Result<Vec<ProcessRecord>, PlatformError> {
        let bytes = self.transport.transact(CALL_RUNNING_PROCESSES, &[])?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn user_profiles(&self) -> Vec<ProfileId> {
        self.world.lock().profiles.clone()
    }

    fn application_info(
        &self,
        profile: ProfileId,
        package: &str,
    ) -> Result<AppMetadata, PlatformError> {
        let request = InfoRequest {
            profile: profile.0,
            package: package.to_string(),
        };
        let payload = serde_json::to_vec(&request)?;
        let bytes = self.transport.transact(CALL_APPLICATION_INFO, &payload)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A complete scriptable platform.
///
/// Wires a broker, a world endpoint behind a [`RoutedTransport`], and the
/// capability services over that transport. Test code scripts the world
/// through the methods here and drives lifecycle through [`StubBroker`].
pub struct StubPlatform {
    broker: Arc<StubBroker>,
    audio: Arc<StubAudioService>,
    directory: Arc<StubProcessDirectory>,
    world: Arc<Mutex<WorldData>>,
    players: Arc<Mutex<HashMap<u32, Arc<StubPlayer>>>>,
    next_player_id: Mutex<u32>,
}

impl StubPlatform {
    pub fn new() -> Self {
        let world = Arc::new(Mutex::new(WorldData {
            profiles: vec![ProfileId(0)],
            ..WorldData::default()
        }));
        let broker = StubBroker::new();

        let endpoint: Arc<dyn RemoteTransport> = Arc::new(StubEndpoint {
            world: Arc::clone(&world),
        });
        let broker_dyn: Arc<dyn PrivilegeBroker> = Arc::clone(&broker) as Arc<dyn PrivilegeBroker>;
        let transport = RoutedTransport::wrap(endpoint, &broker_dyn);

        let players = Arc::new(Mutex::new(HashMap::new()));
        let audio = Arc::new(StubAudioService {
            transport: Arc::clone(&transport),
            players: Arc::clone(&players),
            listeners: Mutex::new(Vec::new()),
        });
        let directory = Arc::new(StubProcessDirectory {
            transport,
            world: Arc::clone(&world),
        });

        Self {
            broker,
            audio,
            directory,
            world,
            players,
            next_player_id: Mutex::new(1),
        }
    }

    pub fn broker(&self) -> Arc<StubBroker> {
        Arc::clone(&self.broker)
    }

    pub fn audio(&self) -> Arc<dyn AudioSessionService> {
        Arc::clone(&self.audio) as Arc<dyn AudioSessionService>
    }

    pub fn directory(&self) -> Arc<dyn ProcessDirectory> {
        Arc::clone(&self.directory) as Arc<dyn ProcessDirectory>
    }

    /// Replace the running-process list.
    pub fn set_processes(&self, processes: Vec<ProcessRecord>) {
        self.world.lock().processes = processes;
    }

    /// Add a user profile.
    pub fn add_profile(&self, profile: ProfileId) {
        self.world.lock().profiles.push(profile);
    }

    /// Replace the profile list.
    pub fn set_profiles(&self, profiles: Vec<ProfileId>) {
        self.world.lock().profiles = profiles;
    }

    /// Register application metadata for one profile.
    pub fn register_app(&self, profile: ProfileId, package: &str, metadata: AppMetadata) {
        self.world
            .lock()
            .apps
            .insert((profile, package.to_string()), metadata);
    }

    /// Add an active playback configuration. Returns the recording player
    /// handle, or `None` when `with_player` is false (platform withheld
    /// access).
    pub fn add_playback(&self, pid: u32, with_player: bool) -> Option<Arc<StubPlayer>> {
        let player = if with_player {
            let id = {
                let mut next = self.next_player_id.lock();
                let id = *next;
                *next += 1;
                id
            };
            let player = StubPlayer::new(format!("player-{}", id));
            self.players.lock().insert(id, Arc::clone(&player));
            self.world.lock().playback.push(PlaybackDescriptor {
                pid,
                player_id: Some(id),
            });
            Some(player)
        } else {
            self.world.lock().playback.push(PlaybackDescriptor {
                pid,
                player_id: None,
            });
            None
        };
        player
    }

    /// Remove every active playback configuration.
    pub fn clear_playback(&self) {
        self.world.lock().playback.clear();
    }

    /// Deliver the current configuration list to every registered
    /// playback listener, as the platform does on any change.
    pub fn notify_playback_changed(&self) {
        let descriptors = self.world.lock().playback.clone();
        let configs = self.audio.resolve(descriptors);
        for listener in self.audio.listeners.lock().iter() {
            listener(configs.clone());
        }
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}
