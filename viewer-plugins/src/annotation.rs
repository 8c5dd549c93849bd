use std::sync::Arc;

use serde::{Deserialize, Serialize};
use viewer_core::{
    CoreError, DispatchPolicy, ObservableState, Plugin, PluginId, Provides, Result, StateStore,
    Unsubscribe,
};

use crate::selection::{SelectionCapability, SelectionPlugin, TextRange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationOptions {
    pub enabled: bool,
    /// Author stamped on annotations created through the capability.
    pub author: String,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            author: "Guest".to_string(),
        }
    }
}

impl AnnotationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.author.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "annotation author must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Highlight,
    Underline,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub page: u32,
    pub kind: AnnotationKind,
    pub author: String,
    pub contents: String,
    /// Text the annotation is anchored to, if any.
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationState {
    pub enabled: bool,
    pub annotations: Vec<Annotation>,
    pub selected: Option<u64>,
    next_id: u64,
}

pub fn initial_state(options: &AnnotationOptions) -> AnnotationState {
    AnnotationState {
        enabled: options.enabled,
        annotations: Vec::new(),
        selected: None,
        next_id: 1,
    }
}

/// An annotation before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub page: u32,
    pub kind: AnnotationKind,
    pub contents: String,
    pub range: Option<TextRange>,
}

impl NewAnnotation {
    pub fn note(page: u32, contents: impl Into<String>) -> Self {
        Self {
            page,
            kind: AnnotationKind::Note,
            contents: contents.into(),
            range: None,
        }
    }
}

pub struct AnnotationPlugin {
    options: Arc<AnnotationOptions>,
    store: StateStore<AnnotationState>,
}

impl AnnotationPlugin {
    pub const ID: PluginId = PluginId::new("annotation");

    pub fn new(options: AnnotationOptions, policy: DispatchPolicy) -> Self {
        let store = StateStore::new(Self::ID, initial_state(&options), policy);
        Self {
            options: Arc::new(options),
            store,
        }
    }

    pub fn options(&self) -> &AnnotationOptions {
        &self.options
    }
}

impl Plugin for AnnotationPlugin {
    fn requires(&self) -> Vec<PluginId> {
        vec![SelectionPlugin::ID]
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.options.validate()?;
        self.store.activate();
        Ok(())
    }

    fn destroy(&self) {
        self.store.dispose();
    }
}

impl Provides for AnnotationPlugin {
    type Capability = AnnotationCapability;

    fn provides(&self) -> AnnotationCapability {
        AnnotationCapability {
            options: Arc::clone(&self.options),
            store: self.store.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationCapability {
    options: Arc<AnnotationOptions>,
    store: StateStore<AnnotationState>,
}

impl AnnotationCapability {
    /// Store a new annotation and return its id, or `None` while disabled.
    pub fn create(&self, draft: NewAnnotation) -> Result<Option<u64>> {
        let author = self.options.author.clone();
        let next = self.store.update_if(move |s| {
            if !s.enabled {
                return None;
            }
            let mut next = s.clone();
            next.annotations.push(Annotation {
                id: s.next_id,
                page: draft.page,
                kind: draft.kind,
                author,
                contents: draft.contents,
                range: draft.range,
            });
            next.next_id += 1;
            Some(next)
        })?;
        Ok(next.map(|s| s.next_id - 1))
    }

    /// Annotate the current text selection. `None` when nothing is selected.
    pub fn annotate_selection(
        &self,
        selection: &SelectionCapability,
        kind: AnnotationKind,
    ) -> Result<Option<u64>> {
        let Some(range) = selection.selection() else {
            return Ok(None);
        };
        self.create(NewAnnotation {
            page: range.page,
            kind,
            contents: String::new(),
            range: Some(range),
        })
    }

    /// Returns whether an annotation was removed.
    pub fn delete(&self, id: u64) -> Result<bool> {
        let next = self.store.update_if(|s| {
            let index = s.annotations.iter().position(|a| a.id == id)?;
            let mut next = s.clone();
            next.annotations.remove(index);
            if next.selected == Some(id) {
                next.selected = None;
            }
            Some(next)
        })?;
        Ok(next.is_some())
    }

    pub fn select(&self, id: u64) -> Result<bool> {
        let next = self.store.update_if(|s| {
            (s.selected != Some(id) && s.annotations.iter().any(|a| a.id == id)).then(|| {
                AnnotationState {
                    selected: Some(id),
                    ..s.clone()
                }
            })
        })?;
        Ok(next.is_some() || self.store.get_state().selected == Some(id))
    }

    pub fn deselect(&self) -> Result<()> {
        self.store.update_if(|s| {
            s.selected.is_some().then(|| AnnotationState {
                selected: None,
                ..s.clone()
            })
        })?;
        Ok(())
    }

    pub fn annotations_on(&self, page: u32) -> Vec<Annotation> {
        self.store
            .get_state()
            .annotations
            .iter()
            .filter(|a| a.page == page)
            .cloned()
            .collect()
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store.update_if(|s| {
            (s.enabled != enabled).then(|| AnnotationState {
                enabled,
                selected: if enabled { s.selected } else { None },
                ..s.clone()
            })
        })?;
        Ok(())
    }

    pub fn flush(&self) -> usize {
        self.store.flush()
    }
}

impl ObservableState for AnnotationCapability {
    type State = AnnotationState;

    fn state(&self) -> Arc<AnnotationState> {
        self.store.get_state()
    }

    fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<AnnotationState>) + Send + Sync + 'static,
    {
        self.store.on_state_change(callback)
    }
}
