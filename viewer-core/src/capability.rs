use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::id::PluginId;
use crate::lifecycle::{Lifecycle, PluginStatus};
use crate::plugin::{Plugin, Provides};
use crate::store::StateStore;
use crate::subscription::Unsubscribe;

/// Read access to a plugin's state plus change notification.
///
/// Implemented by every stateful capability; bindings are generic over it.
pub trait ObservableState {
    type State: Send + Sync + 'static;

    fn state(&self) -> Arc<Self::State>;

    /// Subscribe to subsequent snapshots. The current one is not delivered.
    fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<Self::State>) + Send + Sync + 'static;
}

impl<S: Send + Sync + 'static> ObservableState for StateStore<S> {
    type State = S;

    fn state(&self) -> Arc<S> {
        self.get_state()
    }

    fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        StateStore::on_state_change(self, callback)
    }
}

/// Live view of a plugin's capability.
///
/// `provides()` is `None` until the plugin is ready and `Some` on every read
/// after that, including after teardown.
pub struct Capability<P: Provides> {
    plugin: Arc<P>,
    lifecycle: Arc<Lifecycle>,
}

impl<P: Provides> Clone for Capability<P> {
    fn clone(&self) -> Self {
        Self {
            plugin: Arc::clone(&self.plugin),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<P: Provides> fmt::Debug for Capability<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("plugin", self.lifecycle.id())
            .field("status", &self.lifecycle.status())
            .finish()
    }
}

impl<P: Provides> Capability<P> {
    pub(crate) fn new(plugin: Arc<P>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { plugin, lifecycle }
    }

    pub fn provides(&self) -> Option<P::Capability> {
        self.lifecycle
            .has_been_ready()
            .then(|| self.plugin.provides())
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.has_been_ready()
    }

    pub fn status(&self) -> PluginStatus {
        self.lifecycle.status()
    }

    pub fn id(&self) -> &PluginId {
        self.lifecycle.id()
    }

    /// Wait until the plugin is ready and return its capability.
    pub async fn ready(&self) -> Result<P::Capability> {
        if !self.lifecycle.has_been_ready() {
            self.lifecycle.wait_ready().await?;
        }
        Ok(self.plugin.provides())
    }
}

/// Live view of a plugin instance, for bindings that need the plugin itself.
pub struct PluginHandle<P: Plugin> {
    plugin: Arc<P>,
    lifecycle: Arc<Lifecycle>,
}

impl<P: Plugin> Clone for PluginHandle<P> {
    fn clone(&self) -> Self {
        Self {
            plugin: Arc::clone(&self.plugin),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<P: Plugin> fmt::Debug for PluginHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("plugin", self.lifecycle.id())
            .field("status", &self.lifecycle.status())
            .finish()
    }
}

impl<P: Plugin> PluginHandle<P> {
    pub(crate) fn new(plugin: Arc<P>, lifecycle: Arc<Lifecycle>) -> Self {
        Self { plugin, lifecycle }
    }

    /// The instance, once it has been initialized.
    pub fn plugin(&self) -> Option<Arc<P>> {
        self.lifecycle
            .has_been_ready()
            .then(|| Arc::clone(&self.plugin))
    }

    pub fn is_loading(&self) -> bool {
        !self.lifecycle.has_been_ready()
    }

    pub fn status(&self) -> PluginStatus {
        self.lifecycle.status()
    }

    pub fn id(&self) -> &PluginId {
        self.lifecycle.id()
    }

    pub async fn ready(&self) -> Result<Arc<P>> {
        if !self.lifecycle.has_been_ready() {
            self.lifecycle.wait_ready().await?;
        }
        Ok(Arc::clone(&self.plugin))
    }
}
