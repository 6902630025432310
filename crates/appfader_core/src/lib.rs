//! AppFader Core - Per-Application Volume Engine
//!
//! This crate provides the core engine for AppFader, including:
//! - The application registry (package identity -> metadata, volume,
//!   hidden flag, bound players)
//! - Broker session availability tracking
//! - Playback session mapping (pid -> process -> package resolution)
//! - The preference synchronization loop
//! - The user-facing volume/hidden mutation path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Caller Threads                         │
//! │  (UI layer) ──commands──▶ Manager ◀──events── (UI layer)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Worker Thread                          │
//! │  broker events ─┐                                           │
//! │  pref snapshots ┼──▶ AppRegistry mutation (single owner)    │
//! │  playback lists ┘            │                              │
//! │                              └──writes──▶ store thread      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every registry mutation happens on the worker thread; persistence is
//! the only work that leaves it.

mod config;
mod error;
mod manager;
mod mapper;
mod message;
mod prefs;
mod registry;
mod session;

pub mod logging;

pub use config::ManagerConfig;
pub use error::{ManagerError, ManagerResult};
pub use manager::{Manager, Platform};
pub use message::{AppSnapshot, Command, Event};
pub use registry::{AppEntry, AppRegistry, PlayerBinding};
pub use session::{PermissionState, SessionState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
    }
}
