use std::sync::Arc;

use serde::{Deserialize, Serialize};
use viewer_core::{
    DispatchPolicy, ObservableState, Plugin, PluginId, Provides, Result, StateStore, Unsubscribe,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    pub enabled: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// A run of glyphs on one page, `start..=end` in text order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub page: u32,
    pub start: u32,
    pub end: u32,
}

impl TextRange {
    fn normalized(page: u32, anchor: u32, focus: u32) -> Self {
        Self {
            page,
            start: anchor.min(focus),
            end: anchor.max(focus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub enabled: bool,
    /// A drag is in progress.
    pub selecting: bool,
    /// Glyph where the current drag started.
    pub anchor: Option<(u32, u32)>,
    pub selection: Option<TextRange>,
}

pub fn initial_state(options: &SelectionOptions) -> SelectionState {
    SelectionState {
        enabled: options.enabled,
        selecting: false,
        anchor: None,
        selection: None,
    }
}

pub struct SelectionPlugin {
    options: SelectionOptions,
    store: StateStore<SelectionState>,
}

impl SelectionPlugin {
    pub const ID: PluginId = PluginId::new("selection");

    pub fn new(options: SelectionOptions, policy: DispatchPolicy) -> Self {
        Self {
            store: StateStore::new(Self::ID, initial_state(&options), policy),
            options,
        }
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }
}

impl Plugin for SelectionPlugin {
    fn initialize(&self) -> anyhow::Result<()> {
        self.store.activate();
        Ok(())
    }

    fn destroy(&self) {
        self.store.dispose();
    }
}

impl Provides for SelectionPlugin {
    type Capability = SelectionCapability;

    fn provides(&self) -> SelectionCapability {
        SelectionCapability {
            store: self.store.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionCapability {
    store: StateStore<SelectionState>,
}

impl SelectionCapability {
    pub fn selection(&self) -> Option<TextRange> {
        self.store.get_state().selection
    }

    /// Start a drag at `glyph` on `page`, replacing any previous selection.
    pub fn begin(&self, page: u32, glyph: u32) -> Result<()> {
        self.store.update_if(|s| {
            s.enabled.then(|| SelectionState {
                selecting: true,
                anchor: Some((page, glyph)),
                selection: Some(TextRange::normalized(page, glyph, glyph)),
                ..s.clone()
            })
        })?;
        Ok(())
    }

    /// Move the drag focus. Ignored when no drag is in progress.
    pub fn extend(&self, glyph: u32) -> Result<()> {
        self.store.update_if(|s| {
            let (page, anchor) = s.anchor.filter(|_| s.selecting)?;
            let range = TextRange::normalized(page, anchor, glyph);
            (s.selection != Some(range)).then(|| SelectionState {
                selection: Some(range),
                ..s.clone()
            })
        })?;
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        self.store.update_if(|s| {
            s.selecting.then(|| SelectionState {
                selecting: false,
                anchor: None,
                ..s.clone()
            })
        })?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.update_if(|s| {
            (s.selection.is_some() || s.selecting).then(|| SelectionState {
                selecting: false,
                anchor: None,
                selection: None,
                ..s.clone()
            })
        })?;
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store.update_if(|s| {
            (s.enabled != enabled).then(|| {
                let mut next = s.clone();
                next.enabled = enabled;
                if !enabled {
                    next.selecting = false;
                    next.anchor = None;
                    next.selection = None;
                }
                next
            })
        })?;
        Ok(())
    }

    pub fn flush(&self) -> usize {
        self.store.flush()
    }
}

impl ObservableState for SelectionCapability {
    type State = SelectionState;

    fn state(&self) -> Arc<SelectionState> {
        self.store.get_state()
    }

    fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<SelectionState>) + Send + Sync + 'static,
    {
        self.store.on_state_change(callback)
    }
}
