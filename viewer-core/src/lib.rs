//! Plugin registry, capability views, and per-plugin state stores with
//! ordered change notification.
//!
//! A [`PluginRegistry`] owns plugin instances keyed by [`PluginId`]. Each
//! plugin keeps its state in a [`StateStore`], whose [`NotificationBus`]
//! delivers every new snapshot to subscribers in the order `set_state` was
//! called. UI bindings read a plugin's public API through a live
//! [`Capability`] view, which stays empty until the plugin is ready.

pub mod bus;
pub mod capability;
pub mod config;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod plugin;
pub mod registry;
pub mod store;
pub mod subscription;
mod sync;

// Re-export key types for convenience.
pub use bus::{NotificationBus, PublishReport};
pub use capability::{Capability, ObservableState, PluginHandle};
pub use config::{CoreConfig, DispatchPolicy};
pub use error::{CoreError, Result, SubscriberCallbackError};
pub use id::PluginId;
pub use lifecycle::{Lifecycle, LifecycleEvent, LifecycleTracker, PluginStatus};
pub use plugin::{Plugin, Provides};
pub use registry::PluginRegistry;
pub use store::StateStore;
pub use subscription::{SubscriberId, SubscriptionGuard, Unsubscribe};
