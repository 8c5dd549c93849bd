//! Reference plugins built on `viewer-core`: zoom, text selection and
//! annotations, plus the configuration that wires them into a registry.

pub mod annotation;
pub mod builtin;
pub mod config;
pub mod selection;
pub mod zoom;

pub use annotation::{
    Annotation, AnnotationCapability, AnnotationKind, AnnotationOptions, AnnotationPlugin,
    AnnotationState, NewAnnotation,
};
pub use builtin::{builtin_registry, register_builtin_plugins};
pub use config::ViewerConfig;
pub use selection::{
    SelectionCapability, SelectionOptions, SelectionPlugin, SelectionState, TextRange,
};
pub use zoom::{ZoomCapability, ZoomOptions, ZoomPlugin, ZoomState};
