//! Volume Manager - Main Entry Point
//!
//! The Manager owns the application registry and coordinates the privilege
//! broker, the platform audio service, and the preference store from a
//! single worker thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ callers ──commands──▶            ◀──snapshots── pref store   │
//! │                       worker     ◀──lifecycle── broker       │
//! │ observers ◀──events──            ◀──configs──── audio service│
//! └──────────────────────────────────────────────────────────────┘
//!                          │                │
//!                 AppRegistry        write channel
//!              (thread-confined)           ▼
//!                                   store writer thread
//! ```
//!
//! Caller commands and platform callbacks share one input queue, so every
//! state mutation happens on the worker thread in arrival order: the
//! clear-then-rebuild of player bindings is atomic for observers, and
//! preference snapshots apply strictly in emission order. Only the
//! persistence write-through leaves the worker, via a dedicated writer
//! thread that the caller never waits on.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use appfader_platform::{
    with_privileged, AudioSessionService, BrokerEvent, PlaybackConfig, PrefSnapshot, PrefValue,
    PreferenceStore, PrivilegeBroker, ProcessDirectory,
};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::mapper;
use crate::message::{Command, Event};
use crate::prefs::{self, PrefRecord};
use crate::registry::AppRegistry;
use crate::session::SessionTracker;

/// Everything the manager needs from the platform.
pub struct Platform {
    pub broker: Arc<dyn PrivilegeBroker>,
    pub audio: Arc<dyn AudioSessionService>,
    pub directory: Arc<dyn ProcessDirectory>,
    pub store: Arc<dyn PreferenceStore>,
}

/// Worker input. Caller commands and platform callbacks share one queue.
enum Input {
    Command(Command),
    Broker(BrokerEvent),
    Snapshot(PrefSnapshot),
    PlaybackChanged(Vec<PlaybackConfig>),
}

/// The main volume manager controller
///
/// This struct lives on the caller's thread and communicates with the
/// manager worker via channels.
pub struct Manager {
    /// Channel for sending inputs to the worker
    input_sender: Sender<Input>,

    /// Channel for receiving events from the worker
    event_receiver: Receiver<Event>,

    /// Handle to the worker thread
    worker: Option<JoinHandle<()>>,
}

impl Manager {
    /// Create a new manager with default configuration
    pub fn new(platform: Platform) -> ManagerResult<Self> {
        Self::with_config(platform, ManagerConfig::default())
    }

    /// Create a new manager with custom configuration
    pub fn with_config(platform: Platform, config: ManagerConfig) -> ManagerResult<Self> {
        let (input_sender, input_receiver) = unbounded::<Input>();
        let (event_sender, event_receiver) = unbounded::<Event>();
        let (write_sender, write_receiver) = unbounded::<(String, PrefValue)>();

        // Persistence must never block the worker; writes drain on their
        // own thread.
        let store = Arc::clone(&platform.store);
        thread::Builder::new()
            .name("appfader-store".into())
            .spawn(move || store_writer_main(store, write_receiver))
            .map_err(|e| ManagerError::WorkerSpawn(e.to_string()))?;

        // Broker lifecycle events feed the worker queue. The subscription
        // is sticky: an already-connected broker replays Connected here.
        {
            let sender = input_sender.clone();
            platform.broker.subscribe(Box::new(move |event| {
                let _ = sender.send(Input::Broker(event));
            }));
        }

        let worker_input = input_sender.clone();
        let worker = thread::Builder::new()
            .name("appfader-manager".into())
            .spawn(move || {
                worker_main(
                    platform,
                    config,
                    input_receiver,
                    worker_input,
                    event_sender,
                    write_sender,
                );
            })
            .map_err(|e| ManagerError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            input_sender,
            event_receiver,
            worker: Some(worker),
        })
    }

    /// Set an application's desired volume (clamped to 0.0 - 1.0)
    ///
    /// Updates in-memory state and every bound player immediately; the new
    /// value is persisted in the background.
    pub fn set_volume(&self, package: impl Into<String>, volume: f32) -> ManagerResult<()> {
        self.send_command(Command::SetVolume {
            package: package.into(),
            volume,
        })
    }

    /// Set an application's hidden flag
    pub fn set_hidden(&self, package: impl Into<String>, hidden: bool) -> ManagerResult<()> {
        self.send_command(Command::SetHidden {
            package: package.into(),
            hidden,
        })
    }

    /// Ask the privilege broker to prompt the user for the grant
    pub fn request_permission(&self) -> ManagerResult<()> {
        self.send_command(Command::RequestPermission)
    }

    /// Request current state (triggers StateUpdate event)
    pub fn request_state(&self) -> ManagerResult<()> {
        self.send_command(Command::RequestState)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    /// Get next event, waiting at most `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Send command to the worker
    fn send_command(&self, command: Command) -> ManagerResult<()> {
        self.input_sender
            .send(Input::Command(command))
            .map_err(|_| ManagerError::ChannelSendError)
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        debug!("Manager shutting down");
        let _ = self.input_sender.send(Input::Command(Command::Shutdown));
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Store writer main loop. Exits when the worker drops its write sender.
fn store_writer_main(store: Arc<dyn PreferenceStore>, writes: Receiver<(String, PrefValue)>) {
    while let Ok((key, value)) = writes.recv() {
        if let Err(e) = store.edit(&key, value) {
            warn!("Failed to persist preference {}: {}", key, e);
        }
    }
    debug!("Store writer exited");
}

/// State owned by the worker thread.
struct Worker {
    platform: Platform,
    registry: AppRegistry,
    tracker: SessionTracker,
    input_sender: Sender<Input>,
    event_sender: Sender<Event>,
    write_sender: Sender<(String, PrefValue)>,

    /// Whether the store subscription exists. Created at most once.
    store_subscribed: bool,

    /// Last snapshot seen; replayed when the sync loop re-arms after a
    /// broker reconnect, matching the store stream's replay-on-subscribe.
    last_snapshot: Option<PrefSnapshot>,

    /// First-snapshot gate: set when the sync loop (re)starts, consumed by
    /// the snapshot that triggers initial enumeration.
    awaiting_first_snapshot: bool,

    /// Whether the platform playback callback is registered. At most once.
    playback_listener_registered: bool,
}

/// Worker thread main loop
fn worker_main(
    platform: Platform,
    config: ManagerConfig,
    inputs: Receiver<Input>,
    input_sender: Sender<Input>,
    event_sender: Sender<Event>,
    write_sender: Sender<(String, PrefValue)>,
) {
    info!("Manager worker started");

    let registry = AppRegistry::new(Arc::clone(&platform.directory), config.default_volume);
    let mut worker = Worker {
        platform,
        registry,
        tracker: SessionTracker::new(),
        input_sender,
        event_sender,
        write_sender,
        store_subscribed: false,
        last_snapshot: None,
        awaiting_first_snapshot: false,
        playback_listener_registered: false,
    };

    while let Ok(input) = inputs.recv() {
        match input {
            Input::Command(Command::Shutdown) => {
                info!("Shutdown command received");
                break;
            }
            Input::Command(command) => worker.handle_command(command),
            Input::Broker(event) => worker.handle_broker_event(event),
            Input::Snapshot(snapshot) => worker.apply_snapshot(snapshot),
            Input::PlaybackChanged(configs) => worker.rebuild_players(configs),
        }
    }

    info!("Manager worker exited");
}

impl Worker {
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetVolume { package, volume } => {
                let volume = volume.clamp(0.0, 1.0);
                let entry = self.registry.get_or_create(&package);
                entry.volume = volume;

                // Best effort: a dead handle is logged and skipped, the
                // remaining players still receive the new volume.
                for binding in &entry.players {
                    if let Err(e) = binding.player.set_volume(volume) {
                        warn!("Failed to set volume on a player of {}: {}", package, e);
                    }
                }

                let _ = self
                    .write_sender
                    .send((prefs::volume_key(&package), PrefValue::Float(volume)));
                let _ = self
                    .event_sender
                    .send(Event::VolumeChanged { package, volume });
            }

            Command::SetHidden { package, hidden } => {
                self.registry.get_or_create(&package).hidden = hidden;

                let _ = self
                    .write_sender
                    .send((prefs::hidden_key(&package), PrefValue::Flag(hidden)));
                let _ = self
                    .event_sender
                    .send(Event::HiddenChanged { package, hidden });
            }

            Command::RequestPermission => {
                debug!("Requesting broker permission");
                self.platform.broker.request_permission();
            }

            Command::RequestState => {
                let _ = self.event_sender.send(Event::StateUpdate {
                    session: self.tracker.state(),
                    apps: self.registry.snapshots(),
                });
            }

            Command::Shutdown => {
                // Handled in the worker loop
            }
        }
    }

    fn handle_broker_event(&mut self, event: BrokerEvent) {
        let changed = match event {
            BrokerEvent::Connected => {
                let granted = self.platform.broker.check_permission();
                self.tracker.on_connected(granted)
            }
            BrokerEvent::Disconnected => self.tracker.on_disconnected(),
            BrokerEvent::PermissionResult(granted) => self.tracker.on_permission_result(granted),
        };

        if let Some(state) = changed {
            info!("Session state: {:?}", state);
            let _ = self.event_sender.send(Event::SessionChanged { state });

            if state.permission_granted() {
                self.start_sync_loop();
            }
        }
    }

    /// Start (or re-arm) the preference synchronization loop.
    ///
    /// The store subscription is created exactly once. Every (re)grant
    /// re-arms the first-snapshot gate, so initial enumeration runs again
    /// after a broker reconnect; the stream's replay semantics are matched
    /// by re-applying the last snapshot when one is already held.
    fn start_sync_loop(&mut self) {
        self.awaiting_first_snapshot = true;

        if self.store_subscribed {
            if let Some(snapshot) = self.last_snapshot.clone() {
                debug!("Sync loop re-armed, replaying last snapshot");
                self.apply_snapshot(snapshot);
            }
            return;
        }

        info!("Preference synchronization started");
        self.store_subscribed = true;
        let sender = self.input_sender.clone();
        self.platform.store.subscribe(Box::new(move |snapshot| {
            let _ = sender.send(Input::Snapshot(snapshot));
        }));
    }

    /// Apply one preference snapshot.
    ///
    /// Records update in-memory state only (passive set): no player push
    /// and no store write, so snapshots triggered by our own writes cannot
    /// feed back. Preferences are applied before the first-snapshot gate
    /// fires, so initial enumeration observes them.
    fn apply_snapshot(&mut self, snapshot: PrefSnapshot) {
        debug!("Applying preference snapshot ({} records)", snapshot.len());

        for (key, value) in &snapshot {
            match prefs::decode(key, value) {
                Some(PrefRecord::Volume { package, volume }) => {
                    self.registry.get_or_create(&package).volume = volume.clamp(0.0, 1.0);
                }
                Some(PrefRecord::Hidden { package, hidden }) => {
                    self.registry.get_or_create(&package).hidden = hidden;
                }
                None => {
                    debug!("Ignoring unknown preference record: {}", key);
                }
            }
        }

        self.last_snapshot = Some(snapshot);

        if self.awaiting_first_snapshot {
            self.awaiting_first_snapshot = false;
            self.run_initial_enumeration();
        }

        let _ = self.event_sender.send(Event::AppsUpdated {
            apps: self.registry.snapshots(),
        });
    }

    /// Enumerate current playback and register the ongoing callback.
    fn run_initial_enumeration(&mut self) {
        info!("Running initial playback enumeration");

        let configs = match with_privileged(|| self.platform.audio.active_playback_configs()) {
            Ok(configs) => configs,
            Err(e) => {
                warn!("Initial playback enumeration failed: {}", e);
                let _ = self.event_sender.send(Event::error(e));
                return;
            }
        };

        self.rebuild_players(configs);

        if !self.playback_listener_registered {
            self.playback_listener_registered = true;
            let sender = self.input_sender.clone();
            self.platform
                .audio
                .register_playback_listener(Box::new(move |configs| {
                    let _ = sender.send(Input::PlaybackChanged(configs));
                }));
        }
    }

    /// Full clear-then-rebuild of every entry's player bindings.
    fn rebuild_players(&mut self, configs: Vec<PlaybackConfig>) {
        // Nothing from a previous configuration list may survive.
        self.registry.clear_players();

        let processes = match with_privileged(|| self.platform.directory.running_processes()) {
            Ok(processes) => processes,
            Err(e) => {
                warn!("Running-process query failed, aborting rebind: {}", e);
                let _ = self.event_sender.send(Event::error(e));
                return;
            }
        };

        let bound = mapper::bind_playback_configs(&mut self.registry, &processes, configs);
        debug!(
            "Bound {} players across {} applications",
            bound,
            self.registry.len()
        );

        let _ = self.event_sender.send(Event::AppsUpdated {
            apps: self.registry.snapshots(),
        });
    }
}
