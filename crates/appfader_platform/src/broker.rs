//! Privilege Broker Abstraction
//!
//! Models the companion privileged process that grants elevated access to
//! system services: connection lifecycle events, a one-time permission
//! grant, and privileged-channel wrapping of raw service transports.
//!
//! All transitions are event-driven; nothing here polls.

use std::sync::Arc;

use crate::transport::RemoteTransport;

/// Connection and permission lifecycle events from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker process connected and its channel is usable.
    Connected,

    /// The broker process went away. Privileged calls fail until it
    /// reconnects; live player handles are no longer valid.
    Disconnected,

    /// Outcome of a permission request (`true` = granted).
    PermissionResult(bool),
}

pub type BrokerListener = Box<dyn Fn(BrokerEvent) + Send + 'static>;

/// The privilege broker capability.
pub trait PrivilegeBroker: Send + Sync {
    /// Register a lifecycle listener.
    ///
    /// Sticky: if the broker is already connected, `Connected` is replayed
    /// to the new listener immediately.
    fn subscribe(&self, listener: BrokerListener);

    /// Whether the user has granted the privilege.
    fn check_permission(&self) -> bool;

    /// Ask the user for the privilege. The outcome arrives asynchronously
    /// as a [`BrokerEvent::PermissionResult`].
    fn request_permission(&self);

    /// Return the privileged-channel twin of a raw service transport.
    ///
    /// The returned transport fails per call with
    /// [`crate::PlatformError::BrokerUnavailable`] while the broker is
    /// disconnected.
    fn wrap_call(&self, raw: Arc<dyn RemoteTransport>) -> Arc<dyn RemoteTransport>;
}
