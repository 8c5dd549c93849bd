use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use viewer_core::{
    CoreError, DispatchPolicy, ObservableState, Plugin, PluginId, Provides, Result, StateStore,
    Unsubscribe,
};

/// Zoom plugin options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomOptions {
    pub enabled: bool,
    /// Level the plugin starts at and returns to on `reset`.
    pub default_zoom_level: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Increment used by `zoom_in` / `zoom_out`.
    pub zoom_step: f64,
}

impl Default for ZoomOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            default_zoom_level: 1.0,
            min_zoom: 0.25,
            max_zoom: 10.0,
            zoom_step: 0.25,
        }
    }
}

impl ZoomOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(CoreError::InvalidConfig(format!(
                "zoom range {}..={} is empty or non-positive",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.min_zoom..=self.max_zoom).contains(&self.default_zoom_level) {
            return Err(CoreError::InvalidConfig(format!(
                "default zoom level {} outside {}..={}",
                self.default_zoom_level, self.min_zoom, self.max_zoom
            )));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "zoom_step must be positive and finite, got {}",
                self.zoom_step
            )));
        }
        Ok(())
    }

    fn clamp(&self, level: f64) -> f64 {
        level.clamp(self.min_zoom, self.max_zoom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    pub enabled: bool,
    pub zoom_level: f64,
}

/// First snapshot for the given options. Pure; bindings call it before any
/// subscription exists.
pub fn initial_state(options: &ZoomOptions) -> ZoomState {
    ZoomState {
        enabled: options.enabled,
        zoom_level: options.default_zoom_level,
    }
}

pub struct ZoomPlugin {
    options: Arc<ZoomOptions>,
    store: StateStore<ZoomState>,
}

impl ZoomPlugin {
    pub const ID: PluginId = PluginId::new("zoom");

    pub fn new(options: ZoomOptions, policy: DispatchPolicy) -> Self {
        let store = StateStore::new(Self::ID, initial_state(&options), policy);
        Self {
            options: Arc::new(options),
            store,
        }
    }

    pub fn options(&self) -> &ZoomOptions {
        &self.options
    }
}

impl Plugin for ZoomPlugin {
    fn initialize(&self) -> anyhow::Result<()> {
        self.options.validate()?;
        self.store.activate();
        Ok(())
    }

    fn destroy(&self) {
        self.store.dispose();
    }
}

impl Provides for ZoomPlugin {
    type Capability = ZoomCapability;

    fn provides(&self) -> ZoomCapability {
        ZoomCapability {
            options: Arc::clone(&self.options),
            store: self.store.clone(),
        }
    }
}

/// Public API of the zoom plugin.
#[derive(Debug, Clone)]
pub struct ZoomCapability {
    options: Arc<ZoomOptions>,
    store: StateStore<ZoomState>,
}

impl ZoomCapability {
    pub fn zoom_level(&self) -> f64 {
        self.store.get_state().zoom_level
    }

    /// Set the zoom level, clamped to the configured range. Ignored while the
    /// plugin is disabled, when the level is not a finite number, or when the
    /// level would not change.
    pub fn request_zoom(&self, level: f64) -> Result<Arc<ZoomState>> {
        self.zoom_with(|_| level)
    }

    pub fn zoom_in(&self) -> Result<Arc<ZoomState>> {
        let step = self.options.zoom_step;
        self.zoom_with(|current| current + step)
    }

    pub fn zoom_out(&self) -> Result<Arc<ZoomState>> {
        let step = self.options.zoom_step;
        self.zoom_with(|current| current - step)
    }

    // `next` sees the level under the store's writer lock, so concurrent
    // steps compose.
    fn zoom_with(&self, next: impl FnOnce(f64) -> f64) -> Result<Arc<ZoomState>> {
        let changed = self.store.update_if(|s| {
            if !s.enabled {
                return None;
            }
            let requested = next(s.zoom_level);
            if !requested.is_finite() {
                debug!(level = requested, "ignoring non-finite zoom level");
                return None;
            }
            let target = self.options.clamp(requested);
            (s.zoom_level != target).then(|| ZoomState {
                zoom_level: target,
                ..s.clone()
            })
        })?;
        Ok(changed.unwrap_or_else(|| self.store.get_state()))
    }

    pub fn reset(&self) -> Result<Arc<ZoomState>> {
        self.request_zoom(self.options.default_zoom_level)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store.update_if(|s| {
            (s.enabled != enabled).then(|| ZoomState {
                enabled,
                ..s.clone()
            })
        })?;
        Ok(())
    }

    /// Replace the whole snapshot.
    pub fn set_state(&self, next: ZoomState) -> Result<()> {
        self.store.set_state(next)
    }

    /// Deliver notifications queued under [`DispatchPolicy::Deferred`].
    pub fn flush(&self) -> usize {
        self.store.flush()
    }
}

impl ObservableState for ZoomCapability {
    type State = ZoomState;

    fn state(&self) -> Arc<ZoomState> {
        self.store.get_state()
    }

    fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<ZoomState>) + Send + Sync + 'static,
    {
        self.store.on_state_change(callback)
    }
}
