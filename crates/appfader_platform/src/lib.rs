//! AppFader Platform - Capability Boundary
//!
//! This crate defines what the engine needs from the host platform and how
//! privileged access is obtained:
//!
//! - Privileged call routing: a scoped, per-call switch between the normal
//!   permission-checked transport and the privilege broker's channel
//! - The privilege broker abstraction (connection lifecycle, permission
//!   grant, privileged-channel wrapping)
//! - Capability traits for the audio service and process/package
//!   introspection
//! - The persisted preference store (in-memory and JSON file backed)
//! - A scriptable in-memory stub backend for tests and headless runs
//!
//! # Architecture
//!
//! Concrete platform bindings (hidden system APIs, reflection shims)
//! implement the capability traits behind a [`RoutedTransport`]; the
//! engine marks the operations that must elevate with [`with_privileged`]
//! and stays unaware of the wire format underneath.

mod broker;
mod error;
mod store;
mod stub;
mod traits;
mod transport;

pub use broker::{BrokerEvent, BrokerListener, PrivilegeBroker};
pub use error::PlatformError;
pub use store::{
    JsonPreferenceStore, MemoryPreferenceStore, PrefSnapshot, PrefValue, PreferenceStore,
    SnapshotListener,
};
pub use stub::{StubBroker, StubPlatform, StubPlayer};
pub use traits::{
    AppMetadata, AudioSessionService, PlaybackConfig, PlaybackListener, PlayerControl,
    ProcessDirectory, ProcessRecord, ProfileId,
};
pub use transport::{
    privileged_route_active, with_privileged, PrivilegedScope, RemoteTransport, RoutedTransport,
};
