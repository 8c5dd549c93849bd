use std::any::Any;

use crate::id::PluginId;

/// A self-contained feature module owning its own state and public API.
///
/// Instances are handed to [`crate::PluginRegistry::register`] and live until
/// registry teardown.
pub trait Plugin: Any + Send + Sync {
    /// Plugins that must be ready before this one initializes.
    fn requires(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Called once on the `Uninitialized -> Ready` transition. An error leaves
    /// the plugin uninitialized.
    ///
    /// Must call [`crate::StateStore::activate`] on every store the plugin
    /// owns; until then those stores reject writes and subscriptions. Runs
    /// while the registry's lifecycle lock is held, so calling
    /// `initialize`/`initialize_all`/`teardown` on the same registry from here
    /// fails with [`crate::CoreError::ReentrantTransition`] (teardown is
    /// ignored).
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once at registry teardown. Must dispose every state store the
    /// plugin owns so subscribers are released. A panic here is caught and
    /// logged; the plugin is still marked disposed. The same re-entrancy rule
    /// as `initialize` applies.
    fn destroy(&self);
}

/// A plugin with a public API surface.
pub trait Provides: Plugin {
    type Capability: Clone + Send + Sync + 'static;

    fn provides(&self) -> Self::Capability;
}
