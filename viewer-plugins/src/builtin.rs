use tracing::debug;
use viewer_core::{PluginRegistry, Result};

use crate::annotation::AnnotationPlugin;
use crate::config::ViewerConfig;
use crate::selection::SelectionPlugin;
use crate::zoom::ZoomPlugin;

/// Register zoom, selection and annotation under their well-known ids. Stores
/// use the registry's dispatch policy.
pub fn register_builtin_plugins(registry: &PluginRegistry, config: &ViewerConfig) -> Result<()> {
    let policy = registry.config().dispatch;
    registry.register(ZoomPlugin::ID, ZoomPlugin::new(config.zoom.clone(), policy))?;
    registry.register(
        SelectionPlugin::ID,
        SelectionPlugin::new(config.selection.clone(), policy),
    )?;
    registry.register(
        AnnotationPlugin::ID,
        AnnotationPlugin::new(config.annotation.clone(), policy),
    )?;
    debug!(?policy, "registered builtin plugins");
    Ok(())
}

/// Validate `config`, then build a registry with the builtin plugins registered
/// but not yet initialized.
pub fn builtin_registry(config: &ViewerConfig) -> Result<PluginRegistry> {
    config.validate()?;
    let registry = PluginRegistry::new(config.core.clone());
    register_builtin_plugins(&registry, config)?;
    Ok(registry)
}
