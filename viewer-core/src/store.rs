use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, trace, warn};

use crate::bus::NotificationBus;
use crate::config::DispatchPolicy;
use crate::error::{CoreError, Result};
use crate::id::PluginId;
use crate::subscription::Unsubscribe;
use crate::sync::{lock, read, write};

struct DispatchQueue<S> {
    pending: VecDeque<Arc<S>>,
    draining: bool,
}

struct Shared<S> {
    plugin: PluginId,
    current: RwLock<Arc<S>>,
    queue: Mutex<DispatchQueue<S>>,
    // Serializes writers so `update` never loses a concurrent `set_state`.
    writer: Mutex<()>,
    bus: NotificationBus<S>,
    policy: DispatchPolicy,
    active: AtomicBool,
    disposed: AtomicBool,
}

/// Current snapshot of one plugin's state plus its notification bus.
///
/// A new store is inactive: its initial snapshot can be read, but writes fail
/// with [`CoreError::NotReady`] and subscriptions are not registered until
/// [`StateStore::activate`] is called, normally from the owning plugin's
/// `initialize` hook. Cloning yields another handle to the same store.
pub struct StateStore<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("plugin", &self.shared.plugin)
            .field("state", &*read(&self.shared.current))
            .field("policy", &self.shared.policy)
            .finish()
    }
}

/// Resets the draining flag if publishing unwinds.
struct DrainGuard<'a, S> {
    queue: &'a Mutex<DispatchQueue<S>>,
    armed: bool,
}

impl<S> Drop for DrainGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.queue).draining = false;
        }
    }
}

impl<S: Send + Sync + 'static> StateStore<S> {
    pub fn new(plugin: PluginId, initial: S, policy: DispatchPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus: NotificationBus::new(plugin.clone()),
                plugin,
                current: RwLock::new(Arc::new(initial)),
                queue: Mutex::new(DispatchQueue {
                    pending: VecDeque::new(),
                    draining: false,
                }),
                writer: Mutex::new(()),
                policy,
                active: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&read(&self.shared.current))
    }

    /// Open the store for writes and subscriptions.
    pub fn activate(&self) {
        if !self.shared.active.swap(true, Ordering::AcqRel) {
            debug!(plugin = %self.shared.plugin, "state store active");
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::Acquire) {
            warn!(plugin = %self.shared.plugin, "set_state on disposed store");
            return Err(CoreError::Disposed(self.shared.plugin.clone()));
        }
        if !self.is_active() {
            warn!(plugin = %self.shared.plugin, "set_state before the plugin is ready");
            return Err(CoreError::NotReady(self.shared.plugin.clone()));
        }
        Ok(())
    }

    /// Replace the snapshot and queue exactly one notification for it.
    pub fn set_state(&self, next: S) -> Result<()> {
        let writer = lock(&self.shared.writer);
        self.ensure_writable()?;
        self.enqueue(next)?;
        drop(writer);
        self.after_write();
        Ok(())
    }

    /// Derive the next snapshot from the current one.
    ///
    /// `f` runs while other writers are held off and must not call back into
    /// this store.
    pub fn update<F>(&self, f: F) -> Result<Arc<S>>
    where
        F: FnOnce(&S) -> S,
    {
        let writer = lock(&self.shared.writer);
        self.ensure_writable()?;
        let current = self.get_state();
        let snapshot = self.enqueue(f(&current))?;
        drop(writer);
        self.after_write();
        Ok(snapshot)
    }

    /// Like [`StateStore::update`], but `f` may decline to change anything by
    /// returning `None`, in which case nothing is published.
    pub fn update_if<F>(&self, f: F) -> Result<Option<Arc<S>>>
    where
        F: FnOnce(&S) -> Option<S>,
    {
        let writer = lock(&self.shared.writer);
        self.ensure_writable()?;
        let current = self.get_state();
        let Some(next) = f(&current) else {
            return Ok(None);
        };
        let snapshot = self.enqueue(next)?;
        drop(writer);
        self.after_write();
        Ok(Some(snapshot))
    }

    fn enqueue(&self, next: S) -> Result<Arc<S>> {
        // Dispose does not take the writer lock, so check again.
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(CoreError::Disposed(self.shared.plugin.clone()));
        }
        let snapshot = Arc::new(next);
        // The queue lock orders snapshot replacement and notification together.
        let mut queue = lock(&self.shared.queue);
        *write(&self.shared.current) = Arc::clone(&snapshot);
        queue.pending.push_back(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn after_write(&self) {
        if self.shared.policy == DispatchPolicy::Immediate {
            self.flush();
        }
    }

    /// Deliver queued notifications in order. Returns how many were published.
    ///
    /// If a flush is already running (a subscriber called `set_state`, or
    /// another thread is flushing), this returns 0 and the running flush
    /// delivers the new entries after the current one.
    pub fn flush(&self) -> usize {
        {
            let mut queue = lock(&self.shared.queue);
            if queue.draining {
                return 0;
            }
            queue.draining = true;
        }
        let mut guard = DrainGuard {
            queue: &self.shared.queue,
            armed: true,
        };

        let mut published = 0;
        loop {
            let next = {
                let mut queue = lock(&self.shared.queue);
                let next = queue.pending.pop_front();
                // Cleared in the same critical section as the empty check, so a
                // concurrent writer either lands in this loop or drains itself.
                if next.is_none() {
                    queue.draining = false;
                }
                next
            };
            let Some(snapshot) = next else {
                guard.armed = false;
                break;
            };
            let report = self.shared.bus.publish(&snapshot);
            trace!(
                plugin = %self.shared.plugin,
                delivered = report.delivered,
                failed = report.failures.len(),
                "state published"
            );
            published += 1;
        }
        published
    }

    /// Number of notifications waiting for a flush.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).pending.len()
    }

    /// Subscribe to later snapshots. Before activation nothing is registered
    /// and an already-released handle is returned.
    pub fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        if !self.is_active() {
            debug!(
                plugin = %self.shared.plugin,
                "subscription ignored before the plugin is ready"
            );
            return Unsubscribe::inert();
        }
        self.shared.bus.on_state_change(callback)
    }

    pub fn try_on_state_change<F>(&self, callback: F) -> Result<Unsubscribe>
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        if !self.is_active() {
            return Err(CoreError::NotReady(self.shared.plugin.clone()));
        }
        self.shared.bus.try_on_state_change(callback)
    }

    pub fn bus(&self) -> &NotificationBus<S> {
        &self.shared.bus
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.shared.policy
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.shared.plugin
    }

    /// Drop queued notifications, release all subscribers, and reject
    /// further writes. The last snapshot stays readable.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut queue = lock(&self.shared.queue);
            let n = queue.pending.len();
            queue.pending.clear();
            n
        };
        if dropped > 0 {
            warn!(
                plugin = %self.shared.plugin,
                dropped, "disposed with undelivered notifications"
            );
        }
        self.shared.bus.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Zoom {
        enabled: bool,
        level: u32,
    }

    fn inactive_store(policy: DispatchPolicy) -> StateStore<Zoom> {
        StateStore::new(
            PluginId::new("zoom"),
            Zoom {
                enabled: true,
                level: 1,
            },
            policy,
        )
    }

    fn store(policy: DispatchPolicy) -> StateStore<Zoom> {
        let store = inactive_store(policy);
        store.activate();
        store
    }

    fn level(level: u32) -> Zoom {
        Zoom {
            enabled: true,
            level,
        }
    }

    fn collect(store: &StateStore<Zoom>) -> (Arc<Mutex<Vec<u32>>>, Unsubscribe) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = store.on_state_change(move |s: &Arc<Zoom>| sink.lock().unwrap().push(s.level));
        (seen, handle)
    }

    #[test]
    fn get_state_returns_initial_snapshot() {
        let store = store(DispatchPolicy::Immediate);
        assert_eq!(*store.get_state(), level(1));
    }

    #[test]
    fn inactive_store_rejects_writes_and_subscriptions() {
        let store = inactive_store(DispatchPolicy::Immediate);
        assert!(!store.is_active());
        let (seen, handle) = collect(&store);
        assert!(!handle.is_active());
        assert_eq!(store.bus().subscriber_count(), 0);
        assert!(matches!(
            store.try_on_state_change(|_| {}),
            Err(CoreError::NotReady(_))
        ));

        assert_eq!(
            store.set_state(level(4)).unwrap_err(),
            CoreError::NotReady(PluginId::new("zoom"))
        );
        assert!(store.update(|_| level(5)).is_err());
        assert!(store.update_if(|_| Some(level(6))).is_err());
        assert_eq!(*store.get_state(), level(1));
        assert_eq!(store.pending(), 0);

        store.activate();
        let (after, _h) = collect(&store);
        store.set_state(level(4)).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(*after.lock().unwrap(), vec![4]);
    }

    #[test]
    fn every_subscriber_sees_every_snapshot_in_order() {
        let store = store(DispatchPolicy::Immediate);
        let subscribers: Vec<_> = (0..3).map(|_| collect(&store)).collect();

        for n in 2..=6 {
            store.set_state(level(n)).unwrap();
        }

        for (seen, _) in &subscribers {
            assert_eq!(*seen.lock().unwrap(), vec![2, 3, 4, 5, 6]);
        }
        assert_eq!(*store.get_state(), level(6));
    }

    #[test]
    fn identical_consecutive_states_are_not_coalesced() {
        let store = store(DispatchPolicy::Immediate);
        let (seen, _h) = collect(&store);
        store.set_state(level(2)).unwrap();
        store.set_state(level(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![2, 2]);
    }

    #[test]
    fn unsubscribe_mid_sequence() {
        let store = store(DispatchPolicy::Immediate);
        let (seen_a, a) = collect(&store);
        let (seen_b, _b) = collect(&store);

        store.set_state(level(2)).unwrap();
        a.unsubscribe();
        store.set_state(level(3)).unwrap();
        store.set_state(level(4)).unwrap();

        assert_eq!(*seen_a.lock().unwrap(), vec![2]);
        assert_eq!(*seen_b.lock().unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn reentrant_set_state_keeps_total_order() {
        let store = store(DispatchPolicy::Immediate);
        let (seen_first, _h1) = collect(&store);

        let inner = store.clone();
        let _h2 = store.on_state_change(move |s: &Arc<Zoom>| {
            if s.level == 2 {
                inner.set_state(level(3)).unwrap();
            }
        });
        let (seen_last, _h3) = collect(&store);

        store.set_state(level(2)).unwrap();

        // Level 3 is published only after every subscriber has seen level 2.
        assert_eq!(*seen_first.lock().unwrap(), vec![2, 3]);
        assert_eq!(*seen_last.lock().unwrap(), vec![2, 3]);
        assert_eq!(*store.get_state(), level(3));
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn deferred_policy_waits_for_flush() {
        let store = store(DispatchPolicy::Deferred);
        let (seen, _h) = collect(&store);

        store.set_state(level(2)).unwrap();
        store.set_state(level(3)).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(*store.get_state(), level(3));
        assert_eq!(store.pending(), 2);

        assert_eq!(store.flush(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
        assert_eq!(store.flush(), 0);
    }

    #[test]
    fn update_derives_from_current() {
        let store = store(DispatchPolicy::Immediate);
        let (seen, _h) = collect(&store);
        let next = store
            .update(|s| Zoom {
                level: s.level * 4,
                ..s.clone()
            })
            .unwrap();
        assert_eq!(next.level, 4);
        assert_eq!(*seen.lock().unwrap(), vec![4]);

        assert!(store.update_if(|_| None).unwrap().is_none());
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = store(DispatchPolicy::Immediate);
        let (seen, _h) = collect(&store);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.update(|s| level(s.level + 1)).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(store.get_state().level, 101);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn dispose_rejects_writes_and_releases_subscribers() {
        let store = store(DispatchPolicy::Deferred);
        let (seen, handle) = collect(&store);
        store.set_state(level(2)).unwrap();

        store.dispose();
        assert!(store.is_disposed());
        assert_eq!(store.pending(), 0);
        assert!(!handle.is_active());
        assert!(matches!(
            store.set_state(level(3)),
            Err(CoreError::Disposed(_))
        ));
        assert_eq!(store.flush(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(*store.get_state(), level(2));
    }
}
