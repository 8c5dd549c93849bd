use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Identifier of a subscriber within one bus.
pub type SubscriberId = u64;

/// Implemented by the bus so handles can detach without knowing the state type.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: SubscriberId) -> bool;
    fn is_attached(&self, id: SubscriberId) -> bool;
}

struct HandleInner {
    bus: Option<Weak<dyn Detach>>,
    id: SubscriberId,
    released: AtomicBool,
}

/// Handle returned by `on_state_change`.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is a no-op. Dropping the
/// handle does not unsubscribe; use [`Unsubscribe::guard`] for scoped release.
#[derive(Clone)]
pub struct Unsubscribe {
    inner: Arc<HandleInner>,
}

impl Unsubscribe {
    pub(crate) fn new(bus: Weak<dyn Detach>, id: SubscriberId) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                bus: Some(bus),
                id,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// A handle that is already released. Returned when subscribing to a
    /// disposed bus.
    pub(crate) fn inert() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                bus: None,
                id: 0,
                released: AtomicBool::new(true),
            }),
        }
    }

    pub fn unsubscribe(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.inner.bus.as_ref().and_then(Weak::upgrade) {
            bus.detach(self.inner.id);
        }
    }

    /// Whether this handle still refers to a live subscription.
    pub fn is_active(&self) -> bool {
        !self.inner.released.load(Ordering::Acquire)
            && self
                .inner
                .bus
                .as_ref()
                .and_then(Weak::upgrade)
                .is_some_and(|bus| bus.is_attached(self.inner.id))
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Convert into a guard that unsubscribes when dropped.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: Some(self) }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.inner.id)
            .field("released", &self.inner.released.load(Ordering::Acquire))
            .finish()
    }
}

/// Unsubscribes on drop, on every exit path of the owning scope.
#[derive(Debug)]
pub struct SubscriptionGuard {
    handle: Option<Unsubscribe>,
}

impl SubscriptionGuard {
    /// Give up scoped ownership and return the plain handle.
    pub fn into_inner(mut self) -> Unsubscribe {
        match self.handle.take() {
            Some(handle) => handle,
            None => Unsubscribe::inert(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(Unsubscribe::is_active)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unsubscribe();
        }
    }
}
