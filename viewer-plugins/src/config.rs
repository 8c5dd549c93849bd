use std::path::Path;

use serde::{Deserialize, Serialize};
use viewer_core::{CoreConfig, CoreError, Result};

use crate::annotation::AnnotationOptions;
use crate::selection::SelectionOptions;
use crate::zoom::ZoomOptions;

/// Complete viewer configuration. Every section is optional and falls back to
/// its defaults.
///
/// ```toml
/// [core]
/// dispatch = "deferred"
///
/// [zoom]
/// max_zoom = 4.0
///
/// [annotation]
/// author = "Reviewer"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub core: CoreConfig,
    pub zoom: ZoomOptions,
    pub selection: SelectionOptions,
    pub annotation: AnnotationOptions,
}

impl ViewerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.core.validate()?;
        self.zoom.validate()?;
        self.annotation.validate()?;
        Ok(())
    }
}
