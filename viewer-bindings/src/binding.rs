use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;
use viewer_core::{Capability, ObservableState, PluginStatus, Provides, Result, SubscriptionGuard};

/// State type observed through the capability of `P`.
pub type StateOf<P> = <<P as Provides>::Capability as ObservableState>::State;

/// Local mirror of a plugin's state, kept current by a subscription.
///
/// Starts from a caller-supplied initial snapshot (usually the plugin's
/// `initial_state`). Once the capability is available the binding subscribes
/// and replaces its snapshot on every notification. Dropping the binding
/// unsubscribes.
pub struct StateBinding<P>
where
    P: Provides,
    P::Capability: ObservableState,
{
    capability: Capability<P>,
    state: Arc<RwLock<Arc<StateOf<P>>>>,
    updates: Arc<AtomicU64>,
    subscription: Mutex<Option<SubscriptionGuard>>,
}

impl<P> StateBinding<P>
where
    P: Provides,
    P::Capability: ObservableState,
{
    /// Create the binding and subscribe right away if the plugin is ready.
    pub fn new(capability: Capability<P>, initial: StateOf<P>) -> Self {
        let binding = Self {
            capability,
            state: Arc::new(RwLock::new(Arc::new(initial))),
            updates: Arc::new(AtomicU64::new(0)),
            subscription: Mutex::new(None),
        };
        binding.sync();
        binding
    }

    /// Latest snapshot seen by this binding.
    pub fn state(&self) -> Arc<StateOf<P>> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn provides(&self) -> Option<P::Capability> {
        self.capability.provides()
    }

    pub fn status(&self) -> PluginStatus {
        self.capability.status()
    }

    /// Number of notifications applied so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(SubscriptionGuard::is_active)
    }

    /// Subscribe if the capability has become available and no live
    /// subscription exists. Returns whether the binding is subscribed.
    pub fn sync(&self) -> bool {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscription.as_ref().is_some_and(SubscriptionGuard::is_active) {
            return true;
        }
        let Some(provides) = self.capability.provides() else {
            return false;
        };

        let state = Arc::clone(&self.state);
        let updates = Arc::clone(&self.updates);
        let handle = provides.on_state_change(move |next| {
            *state.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(next);
            updates.fetch_add(1, Ordering::AcqRel);
        });
        let active = handle.is_active();
        debug!(plugin = %self.capability.id(), active, "state binding subscribed");
        *subscription = Some(handle.guard());
        active
    }

    /// Wait for the plugin to become ready, then subscribe.
    pub async fn ready(&self) -> Result<P::Capability> {
        let provides = self.capability.ready().await?;
        self.sync();
        Ok(provides)
    }
}

impl<P> fmt::Debug for StateBinding<P>
where
    P: Provides,
    P::Capability: ObservableState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBinding")
            .field("plugin", self.capability.id())
            .field("updates", &self.updates())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
