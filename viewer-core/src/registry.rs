use std::any::{Any, type_name};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};

use tracing::{debug, error, warn};

use crate::capability::{Capability, PluginHandle};
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::id::PluginId;
use crate::lifecycle::{Lifecycle, LifecycleEvent, LifecycleTracker, PluginStatus};
use crate::plugin::{Plugin, Provides};
use crate::sync::{lock, read, write};

struct RegisteredPlugin {
    instance: Arc<dyn Plugin>,
    any: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<Lifecycle>,
}

#[derive(Default)]
struct Inner {
    plugins: HashMap<PluginId, RegisteredPlugin>,
    registration_order: Vec<PluginId>,
    initialization_order: Vec<PluginId>,
}

/// Owns every registered plugin and drives its lifecycle.
///
/// Create one at application start and call [`PluginRegistry::teardown`] on
/// shutdown (or before a hot reload). Plugin hooks run without any registry
/// lock held, so subscribers may query the registry from inside callbacks.
pub struct PluginRegistry {
    config: CoreConfig,
    inner: RwLock<Inner>,
    history: Mutex<LifecycleTracker>,
    // Serializes initialize/teardown so each transition runs its hook once.
    transitions: Mutex<()>,
    // Thread currently holding `transitions`, to refuse calls from inside a hook.
    transition_owner: Mutex<Option<ThreadId>>,
}

struct TransitionGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _held: MutexGuard<'a, ()>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        *lock(self.owner) = None;
    }
}

impl PluginRegistry {
    pub fn new(config: CoreConfig) -> Self {
        let history = LifecycleTracker::new(config.lifecycle_history);
        Self {
            config,
            inner: RwLock::new(Inner::default()),
            history: Mutex::new(history),
            transitions: Mutex::new(()),
            transition_owner: Mutex::new(None),
        }
    }

    /// `None` when the calling thread is already inside initialize/teardown.
    fn enter_transition(&self) -> Option<TransitionGuard<'_>> {
        let me = thread::current().id();
        if *lock(&self.transition_owner) == Some(me) {
            return None;
        }
        let held = lock(&self.transitions);
        *lock(&self.transition_owner) = Some(me);
        Some(TransitionGuard {
            owner: &self.transition_owner,
            _held: held,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn register<P: Plugin>(&self, id: PluginId, instance: P) -> Result<()> {
        let mut inner = write(&self.inner);
        if inner.plugins.contains_key(&id) {
            return Err(CoreError::DuplicateId(id));
        }
        let instance = Arc::new(instance);
        inner.plugins.insert(
            id.clone(),
            RegisteredPlugin {
                instance: instance.clone(),
                any: instance,
                lifecycle: Arc::new(Lifecycle::new(id.clone())),
            },
        );
        inner.registration_order.push(id.clone());
        debug!(plugin = %id, kind = type_name::<P>(), "plugin registered");
        Ok(())
    }

    /// The registered instance. Every call returns the same `Arc`.
    pub fn resolve<P: Plugin>(&self, id: &PluginId) -> Result<Arc<P>> {
        let inner = read(&self.inner);
        let entry = inner
            .plugins
            .get(id)
            .ok_or_else(|| CoreError::NotFound(id.clone()))?;
        Self::downcast(id, entry)
    }

    pub fn plugin<P: Plugin>(&self, id: &PluginId) -> Result<PluginHandle<P>> {
        let inner = read(&self.inner);
        let entry = inner
            .plugins
            .get(id)
            .ok_or_else(|| CoreError::NotFound(id.clone()))?;
        Ok(PluginHandle::new(
            Self::downcast(id, entry)?,
            Arc::clone(&entry.lifecycle),
        ))
    }

    pub fn capability<P: Provides>(&self, id: &PluginId) -> Result<Capability<P>> {
        let inner = read(&self.inner);
        let entry = inner
            .plugins
            .get(id)
            .ok_or_else(|| CoreError::NotFound(id.clone()))?;
        Ok(Capability::new(
            Self::downcast(id, entry)?,
            Arc::clone(&entry.lifecycle),
        ))
    }

    fn downcast<P: Plugin>(id: &PluginId, entry: &RegisteredPlugin) -> Result<Arc<P>> {
        Arc::clone(&entry.any)
            .downcast::<P>()
            .map_err(|_| CoreError::TypeMismatch {
                id: id.clone(),
                expected: type_name::<P>(),
            })
    }

    pub fn status(&self, id: &PluginId) -> Result<PluginStatus> {
        read(&self.inner)
            .plugins
            .get(id)
            .map(|entry| entry.lifecycle.status())
            .ok_or_else(|| CoreError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        read(&self.inner).plugins.contains_key(id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<PluginId> {
        read(&self.inner).registration_order.clone()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner).plugins.is_empty()
    }

    pub fn history(&self) -> Vec<LifecycleEvent> {
        lock(&self.history).events().cloned().collect()
    }

    /// Move one plugin to `Ready`. Every plugin it requires must already be ready.
    ///
    /// Fails with [`CoreError::ReentrantTransition`] when called from inside a
    /// plugin's `initialize` or `destroy` hook.
    pub fn initialize(&self, id: &PluginId) -> Result<()> {
        let Some(_transition) = self.enter_transition() else {
            return Err(CoreError::ReentrantTransition);
        };
        self.initialize_locked(id)
    }

    fn initialize_locked(&self, id: &PluginId) -> Result<()> {
        let (instance, lifecycle) = {
            let inner = read(&self.inner);
            let entry = inner
                .plugins
                .get(id)
                .ok_or_else(|| CoreError::NotFound(id.clone()))?;
            for dependency in entry.instance.requires() {
                match inner.plugins.get(&dependency) {
                    None => {
                        return Err(CoreError::MissingDependency {
                            plugin: id.clone(),
                            dependency,
                        });
                    }
                    Some(dep) if !dep.lifecycle.is_ready() => {
                        return Err(CoreError::DependencyNotReady {
                            plugin: id.clone(),
                            dependency,
                        });
                    }
                    Some(_) => {}
                }
            }
            (Arc::clone(&entry.instance), Arc::clone(&entry.lifecycle))
        };

        let from = lifecycle.status();
        if !from.can_transition_to(PluginStatus::Ready) {
            return Err(CoreError::InvalidTransition {
                id: id.clone(),
                from,
                to: PluginStatus::Ready,
            });
        }

        instance.initialize().map_err(|e| {
            warn!(plugin = %id, "plugin failed to initialize: {e:#}");
            CoreError::InitializationFailed {
                id: id.clone(),
                reason: format!("{e:#}"),
            }
        })?;

        let from = lifecycle.transition(PluginStatus::Ready)?;
        write(&self.inner).initialization_order.push(id.clone());
        lock(&self.history).record(id, from, PluginStatus::Ready);
        debug!(plugin = %id, "plugin ready");
        Ok(())
    }

    /// Initialize every uninitialized plugin, dependencies first.
    ///
    /// Independent plugins initialize in registration order. Stops at the
    /// first failure; plugins initialized before it stay ready.
    pub fn initialize_all(&self) -> Result<()> {
        let Some(_transition) = self.enter_transition() else {
            return Err(CoreError::ReentrantTransition);
        };
        for id in self.initialization_plan()? {
            if self.status(&id)? == PluginStatus::Uninitialized {
                self.initialize_locked(&id)?;
            }
        }
        Ok(())
    }

    fn initialization_plan(&self) -> Result<Vec<PluginId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            id: &PluginId,
            plugins: &HashMap<PluginId, RegisteredPlugin>,
            marks: &mut HashMap<PluginId, Mark>,
            plan: &mut Vec<PluginId>,
        ) -> Result<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(CoreError::DependencyCycle(id.clone())),
                None => {}
            }
            marks.insert(id.clone(), Mark::Visiting);
            if let Some(entry) = plugins.get(id) {
                for dependency in entry.instance.requires() {
                    if !plugins.contains_key(&dependency) {
                        return Err(CoreError::MissingDependency {
                            plugin: id.clone(),
                            dependency,
                        });
                    }
                    visit(&dependency, plugins, marks, plan)?;
                }
            }
            marks.insert(id.clone(), Mark::Done);
            plan.push(id.clone());
            Ok(())
        }

        let inner = read(&self.inner);
        let mut marks = HashMap::new();
        let mut plan = Vec::with_capacity(inner.plugins.len());
        for id in &inner.registration_order {
            visit(id, &inner.plugins, &mut marks, &mut plan)?;
        }
        Ok(plan)
    }

    /// Destroy every plugin (reverse initialization order, then the
    /// never-initialized ones) and empty the registry. A second call is a no-op.
    ///
    /// A panicking `destroy` hook is logged and the plugin is still marked
    /// disposed; the remaining plugins are torn down as usual. Calls from inside
    /// a plugin hook are ignored.
    pub fn teardown(&self) {
        let Some(_transition) = self.enter_transition() else {
            warn!("teardown called from inside a plugin hook; ignored");
            return;
        };
        let (mut plugins, order) = {
            let mut inner = write(&self.inner);
            let mut order: Vec<PluginId> =
                std::mem::take(&mut inner.initialization_order).into_iter().rev().collect();
            let registered = std::mem::take(&mut inner.registration_order);
            let never_initialized: Vec<PluginId> = registered
                .into_iter()
                .rev()
                .filter(|id| !order.contains(id))
                .collect();
            order.extend(never_initialized);
            (std::mem::take(&mut inner.plugins), order)
        };
        if order.is_empty() {
            return;
        }

        for id in order {
            let Some(entry) = plugins.remove(&id) else {
                continue;
            };
            let destroyed = panic::catch_unwind(AssertUnwindSafe(|| entry.instance.destroy()));
            if let Err(payload) = destroyed {
                let message = panic_message(payload.as_ref());
                error!(plugin = %id, "plugin destroy hook panicked: {message}");
            }
            match entry.lifecycle.transition(PluginStatus::Disposed) {
                Ok(from) => lock(&self.history).record(&id, from, PluginStatus::Disposed),
                Err(e) => warn!(plugin = %id, "teardown transition failed: {e}"),
            }
            debug!(plugin = %id, "plugin disposed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
