use crate::id::PluginId;
use crate::lifecycle::PluginStatus;

/// Errors produced by registry, lifecycle, and store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("plugin '{0}' already registered")]
    DuplicateId(PluginId),

    #[error("plugin '{0}' not found")]
    NotFound(PluginId),

    #[error("plugin '{id}' is not a {expected}")]
    TypeMismatch { id: PluginId, expected: &'static str },

    #[error("plugin '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: PluginId,
        from: PluginStatus,
        to: PluginStatus,
    },

    #[error("plugin '{plugin}' requires '{dependency}', which is not registered")]
    MissingDependency {
        plugin: PluginId,
        dependency: PluginId,
    },

    #[error("plugin '{plugin}' requires '{dependency}', which is not ready")]
    DependencyNotReady {
        plugin: PluginId,
        dependency: PluginId,
    },

    #[error("dependency cycle involving plugin '{0}'")]
    DependencyCycle(PluginId),

    #[error("plugin '{id}' failed to initialize: {reason}")]
    InitializationFailed { id: PluginId, reason: String },

    #[error("plugin '{0}' is not ready")]
    NotReady(PluginId),

    #[error("plugin '{0}' has been disposed")]
    Disposed(PluginId),

    #[error("lifecycle operation called from inside a plugin hook")]
    ReentrantTransition,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A subscriber callback panicked while a snapshot was being delivered.
///
/// Never returned to the publisher; surfaced through `tracing` and
/// [`crate::PublishReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("subscriber {subscriber} of plugin '{plugin}' failed: {message}")]
pub struct SubscriberCallbackError {
    pub plugin: PluginId,
    pub subscriber: u64,
    pub message: String,
}
