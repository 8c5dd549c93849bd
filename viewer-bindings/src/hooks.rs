use viewer_core::{Capability, Plugin, PluginHandle, PluginId, PluginRegistry, Provides, Result};

/// Look up the plugin registered under `id`.
///
/// The handle is live: `plugin()` is `None` while the plugin is still loading
/// and turns `Some` once it is initialized.
pub fn use_plugin<P: Plugin>(registry: &PluginRegistry, id: &PluginId) -> Result<PluginHandle<P>> {
    registry.plugin::<P>(id)
}

/// Look up the capability of the plugin registered under `id`.
///
/// Safe to call before initialization; `provides()` is `None` until then.
pub fn use_capability<P: Provides>(
    registry: &PluginRegistry,
    id: &PluginId,
) -> Result<Capability<P>> {
    registry.capability::<P>(id)
}
