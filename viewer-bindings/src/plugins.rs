//! Convenience hooks for the builtin plugins.

use viewer_core::{Capability, PluginHandle, PluginRegistry, Result};
use viewer_plugins::{AnnotationPlugin, SelectionPlugin, ZoomPlugin, annotation, selection, zoom};

use crate::binding::StateBinding;
use crate::hooks::{use_capability, use_plugin};

pub fn use_zoom_capability(registry: &PluginRegistry) -> Result<Capability<ZoomPlugin>> {
    use_capability(registry, &ZoomPlugin::ID)
}

pub fn use_zoom_plugin(registry: &PluginRegistry) -> Result<PluginHandle<ZoomPlugin>> {
    use_plugin(registry, &ZoomPlugin::ID)
}

/// Zoom state binding seeded from the registered plugin's options.
pub fn use_zoom(registry: &PluginRegistry) -> Result<StateBinding<ZoomPlugin>> {
    let initial = zoom::initial_state(registry.resolve::<ZoomPlugin>(&ZoomPlugin::ID)?.options());
    Ok(StateBinding::new(use_zoom_capability(registry)?, initial))
}

pub fn use_selection_capability(registry: &PluginRegistry) -> Result<Capability<SelectionPlugin>> {
    use_capability(registry, &SelectionPlugin::ID)
}

pub fn use_selection_plugin(registry: &PluginRegistry) -> Result<PluginHandle<SelectionPlugin>> {
    use_plugin(registry, &SelectionPlugin::ID)
}

pub fn use_selection(registry: &PluginRegistry) -> Result<StateBinding<SelectionPlugin>> {
    let initial = selection::initial_state(
        registry
            .resolve::<SelectionPlugin>(&SelectionPlugin::ID)?
            .options(),
    );
    Ok(StateBinding::new(use_selection_capability(registry)?, initial))
}

pub fn use_annotation_capability(
    registry: &PluginRegistry,
) -> Result<Capability<AnnotationPlugin>> {
    use_capability(registry, &AnnotationPlugin::ID)
}

pub fn use_annotation_plugin(registry: &PluginRegistry) -> Result<PluginHandle<AnnotationPlugin>> {
    use_plugin(registry, &AnnotationPlugin::ID)
}

pub fn use_annotation(registry: &PluginRegistry) -> Result<StateBinding<AnnotationPlugin>> {
    let initial = annotation::initial_state(
        registry
            .resolve::<AnnotationPlugin>(&AnnotationPlugin::ID)?
            .options(),
    );
    Ok(StateBinding::new(use_annotation_capability(registry)?, initial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use viewer_core::{CoreError, PluginId};
    use viewer_plugins::{NewAnnotation, ViewerConfig, ZoomOptions, builtin_registry};

    #[test]
    fn test_use_zoom_seeds_from_configured_options() {
        let config = ViewerConfig {
            zoom: ZoomOptions {
                default_zoom_level: 1.5,
                ..ZoomOptions::default()
            },
            ..ViewerConfig::default()
        };
        let registry = builtin_registry(&config).unwrap();
        let binding = use_zoom(&registry).unwrap();
        assert_eq!(binding.state().zoom_level, 1.5);
        assert!(binding.provides().is_none());
    }

    #[test]
    fn test_use_annotation_follows_changes() {
        let registry = builtin_registry(&ViewerConfig::default()).unwrap();
        registry.initialize_all().unwrap();
        let binding = use_annotation(&registry).unwrap();
        let selection = use_selection(&registry).unwrap();

        binding
            .provides()
            .unwrap()
            .create(NewAnnotation::note(2, "check this"))
            .unwrap();
        assert_eq!(binding.state().annotations.len(), 1);
        assert_eq!(binding.state().annotations[0].page, 2);
        assert_eq!(selection.updates(), 0);
    }

    #[test]
    fn test_hooks_on_empty_registry() {
        let registry = PluginRegistry::default();
        assert_eq!(
            use_zoom(&registry).unwrap_err(),
            CoreError::NotFound(PluginId::new("zoom"))
        );
        assert!(use_selection_plugin(&registry).is_err());
        assert!(use_annotation_capability(&registry).is_err());
    }
}
