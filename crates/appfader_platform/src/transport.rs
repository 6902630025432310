//! Privileged Call Routing
//!
//! Wraps a remote service transport so that individual calls can be routed
//! over the privilege broker's channel instead of the normal
//! permission-checked path. The route is chosen per call from a scoped,
//! thread-local flag, so concurrent unrelated calls on other threads are
//! never affected by one operation's choice to elevate.
//!
//! The flag follows strict push/pop discipline: [`PrivilegedScope`] records
//! the previous value when entered and restores it on drop, which makes
//! nesting and unwinding both safe.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use crate::broker::PrivilegeBroker;
use crate::error::PlatformError;

/// A binder-like remote call object.
///
/// `transact` carries an opaque request to the remote service and returns
/// its reply. Payload encodings are adapter-specific; callers above the
/// capability traits never interpret them.
pub trait RemoteTransport: Send + Sync {
    fn transact(&self, code: u32, payload: &[u8]) -> Result<Vec<u8>, PlatformError>;

    /// Downcast support, used by [`RoutedTransport::wrap`] to detect an
    /// already-wrapped transport.
    fn as_any(&self) -> &dyn Any;
}

thread_local! {
    static PRIVILEGED_ROUTE: Cell<bool> = const { Cell::new(false) };
}

/// RAII guard marking the current thread's calls as privileged-routed.
pub struct PrivilegedScope {
    prev: bool,
}

impl PrivilegedScope {
    pub fn enter() -> Self {
        let prev = PRIVILEGED_ROUTE.with(|flag| flag.replace(true));
        Self { prev }
    }
}

impl Drop for PrivilegedScope {
    fn drop(&mut self) {
        PRIVILEGED_ROUTE.with(|flag| flag.set(self.prev));
    }
}

/// Run `f` with privileged routing enabled for its dynamic extent.
///
/// The flag is per-thread, so the calls that should elevate must happen
/// synchronously on the calling thread.
pub fn with_privileged<T>(f: impl FnOnce() -> T) -> T {
    let _scope = PrivilegedScope::enter();
    f()
}

/// Whether the current call context prefers the privileged route.
pub fn privileged_route_active() -> bool {
    PRIVILEGED_ROUTE.with(|flag| flag.get())
}

/// Transport that picks the normal or privileged path per call.
///
/// The privileged twin is obtained from the broker once at wrap time; it
/// fails per call with [`PlatformError::BrokerUnavailable`] while the
/// broker is down. A privileged-routed call is never silently downgraded
/// to the normal path.
pub struct RoutedTransport {
    base: Arc<dyn RemoteTransport>,
    privileged: Arc<dyn RemoteTransport>,
}

impl RoutedTransport {
    /// Wrap `base` so calls made inside a [`PrivilegedScope`] go through
    /// the broker's channel.
    ///
    /// Idempotent: wrapping an already-routed transport returns it
    /// unchanged.
    pub fn wrap(
        base: Arc<dyn RemoteTransport>,
        broker: &Arc<dyn PrivilegeBroker>,
    ) -> Arc<dyn RemoteTransport> {
        if base.as_any().is::<RoutedTransport>() {
            return base;
        }

        let privileged = broker.wrap_call(Arc::clone(&base));
        Arc::new(RoutedTransport { base, privileged })
    }
}

impl RemoteTransport for RoutedTransport {
    fn transact(&self, code: u32, payload: &[u8]) -> Result<Vec<u8>, PlatformError> {
        if privileged_route_active() {
            self.privileged.transact(code, payload)
        } else {
            self.base.transact(code, payload)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl CountingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteTransport for CountingTransport {
        fn transact(&self, _code: u32, _payload: &[u8]) -> Result<Vec<u8>, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Broker whose privileged channel is a second counting transport.
    struct TestBroker {
        privileged: Arc<CountingTransport>,
    }

    impl PrivilegeBroker for TestBroker {
        fn subscribe(&self, _listener: BrokerListener) {}

        fn check_permission(&self) -> bool {
            true
        }

        fn request_permission(&self) {}

        fn wrap_call(&self, _raw: Arc<dyn RemoteTransport>) -> Arc<dyn RemoteTransport> {
            Arc::clone(&self.privileged) as Arc<dyn RemoteTransport>
        }
    }

    fn routed() -> (Arc<dyn RemoteTransport>, Arc<CountingTransport>, Arc<CountingTransport>) {
        let base = CountingTransport::new();
        let privileged = CountingTransport::new();
        let broker: Arc<dyn PrivilegeBroker> = Arc::new(TestBroker {
            privileged: Arc::clone(&privileged),
        });
        let transport = RoutedTransport::wrap(Arc::clone(&base) as Arc<dyn RemoteTransport>, &broker);
        (transport, base, privileged)
    }

    #[test]
    fn test_normal_path_by_default() {
        let (transport, base, privileged) = routed();

        transport.transact(1, &[]).unwrap();

        assert_eq!(base.calls(), 1);
        assert_eq!(privileged.calls(), 0);
    }

    #[test]
    fn test_privileged_scope_routes_through_broker() {
        let (transport, base, privileged) = routed();

        with_privileged(|| transport.transact(1, &[])).unwrap();
        transport.transact(1, &[]).unwrap();

        assert_eq!(base.calls(), 1);
        assert_eq!(privileged.calls(), 1);
    }

    #[test]
    fn test_scope_nesting_restores_previous_value() {
        assert!(!privileged_route_active());

        with_privileged(|| {
            assert!(privileged_route_active());
            with_privileged(|| {
                assert!(privileged_route_active());
            });
            // Inner scope exit must not clear the outer scope's flag.
            assert!(privileged_route_active());
        });

        assert!(!privileged_route_active());
    }

    #[test]
    fn test_scope_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            with_privileged(|| {
                panic!("boom");
            })
        });

        assert!(result.is_err());
        assert!(!privileged_route_active());
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let (transport, _base, privileged) = routed();

        let broker: Arc<dyn PrivilegeBroker> = Arc::new(TestBroker {
            privileged: Arc::new(CountingTransport {
                calls: AtomicUsize::new(0),
            }),
        });
        let rewrapped = RoutedTransport::wrap(Arc::clone(&transport), &broker);

        // Same object, not a second layer with a different privileged twin.
        assert!(Arc::ptr_eq(&transport, &rewrapped));

        with_privileged(|| rewrapped.transact(1, &[])).unwrap();
        assert_eq!(privileged.calls(), 1);
    }

    #[test]
    fn test_flag_is_thread_local() {
        with_privileged(|| {
            let handle = std::thread::spawn(|| privileged_route_active());
            assert!(!handle.join().unwrap());
        });
    }
}
