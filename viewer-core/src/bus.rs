use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::error::{CoreError, Result, SubscriberCallbackError};
use crate::id::PluginId;
use crate::subscription::{Detach, SubscriberId, Unsubscribe};
use crate::sync::lock;

type Callback<S> = Box<dyn Fn(&Arc<S>) + Send + Sync>;

struct Entry<S> {
    id: SubscriberId,
    active: AtomicBool,
    callback: Callback<S>,
}

struct Shared<S> {
    plugin: PluginId,
    entries: Mutex<Vec<Arc<Entry<S>>>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
    failures: AtomicUsize,
}

impl<S: Send + Sync + 'static> Detach for Shared<S> {
    fn detach(&self, id: SubscriberId) -> bool {
        let mut entries = lock(&self.entries);
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.active.store(false, Ordering::Release);
        debug!(plugin = %self.plugin, subscriber = id, "unsubscribed");
        true
    }

    fn is_attached(&self, id: SubscriberId) -> bool {
        lock(&self.entries).iter().any(|e| e.id == id)
    }
}

/// Outcome of delivering one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failures: Vec<SubscriberCallbackError>,
}

/// Per-plugin fan-out of state snapshots to subscribers, in subscription order.
pub struct NotificationBus<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for NotificationBus<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for NotificationBus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("plugin", &self.shared.plugin)
            .field("subscribers", &lock(&self.shared.entries).len())
            .field("disposed", &self.shared.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl<S: Send + Sync + 'static> NotificationBus<S> {
    pub fn new(plugin: PluginId) -> Self {
        Self {
            shared: Arc::new(Shared {
                plugin,
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
                failures: AtomicUsize::new(0),
            }),
        }
    }

    /// Register `callback` for every subsequent snapshot.
    ///
    /// The current snapshot is not delivered. On a disposed bus nothing is
    /// registered and an already-released handle is returned.
    pub fn on_state_change<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        match self.try_on_state_change(callback) {
            Ok(handle) => handle,
            Err(_) => {
                debug!(plugin = %self.shared.plugin, "subscription ignored on disposed bus");
                Unsubscribe::inert()
            }
        }
    }

    pub fn try_on_state_change<F>(&self, callback: F) -> Result<Unsubscribe>
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        let mut entries = lock(&self.shared.entries);
        // Checked under the entries lock so a concurrent dispose cannot miss us.
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(CoreError::Disposed(self.shared.plugin.clone()));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Arc::new(Entry {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        }));
        drop(entries);

        debug!(plugin = %self.shared.plugin, subscriber = id, "subscribed");
        let shared: Arc<dyn Detach> = self.shared.clone();
        Ok(Unsubscribe::new(Arc::downgrade(&shared), id))
    }

    /// Deliver `snapshot` to every subscriber registered when the call starts.
    ///
    /// Entries removed while the publish is running are skipped. A panicking
    /// callback is isolated and reported; the remaining subscribers still run.
    pub(crate) fn publish(&self, snapshot: &Arc<S>) -> PublishReport {
        let entries: Vec<Arc<Entry<S>>> = lock(&self.shared.entries).clone();
        let mut report = PublishReport::default();

        for entry in entries {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(snapshot))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    let failure = SubscriberCallbackError {
                        plugin: self.shared.plugin.clone(),
                        subscriber: entry.id,
                        message: panic_message(payload.as_ref()),
                    };
                    self.shared.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        plugin = %failure.plugin,
                        subscriber = failure.subscriber,
                        "state subscriber failed: {}",
                        failure.message
                    );
                    report.failures.push(failure);
                }
            }
        }

        report
    }

    /// Reject further subscriptions and release every subscriber.
    pub fn dispose(&self) {
        let mut entries = lock(&self.shared.entries);
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in entries.drain(..) {
            entry.active.store(false, Ordering::Release);
        }
        debug!(plugin = %self.shared.plugin, "notification bus disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.entries).len()
    }

    /// Total number of subscriber callbacks that panicked on this bus.
    pub fn failed_deliveries(&self) -> usize {
        self.shared.failures.load(Ordering::Relaxed)
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.shared.plugin
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&Arc<u32>) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &Arc<u32>| sink.lock().unwrap().push(**v))
    }

    fn bus() -> NotificationBus<u32> {
        NotificationBus::new(PluginId::new("test"))
    }

    #[test]
    fn subscribe_does_not_deliver_current_value() {
        let bus = bus();
        let (seen, cb) = recorder();
        let _handle = bus.on_state_change(cb);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            bus.on_state_change(move |v: &Arc<u32>| order.lock().unwrap().push((name, **v)));
        }

        let report = bus.publish(&Arc::new(7));
        assert_eq!(report.delivered, 3);
        assert_eq!(*order.lock().unwrap(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = bus();
        let (seen_a, cb_a) = recorder();
        let (seen_b, cb_b) = recorder();
        let a = bus.on_state_change(cb_a);
        let _b = bus.on_state_change(cb_b);

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(&Arc::new(1));
        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec![1]);
    }

    #[test]
    #[traced_test]
    fn panicking_subscriber_is_isolated() {
        let bus = bus();
        let (seen_first, first) = recorder();
        bus.on_state_change(first);
        bus.on_state_change(|_: &Arc<u32>| panic!("boom"));
        let (seen_last, last) = recorder();
        bus.on_state_change(last);

        let report = bus.publish(&Arc::new(3));

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].message, "boom");
        assert_eq!(*seen_first.lock().unwrap(), vec![3]);
        assert_eq!(*seen_last.lock().unwrap(), vec![3]);
        assert_eq!(bus.failed_deliveries(), 1);
        assert!(logs_contain("state subscriber failed: boom"));
    }

    #[test]
    fn unsubscribe_of_later_entry_during_publish_skips_it() {
        let bus = bus();
        let (seen_b, cb_b) = recorder();
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));

        let slot_in_a = Arc::clone(&slot);
        bus.on_state_change(move |_: &Arc<u32>| {
            if let Some(handle) = slot_in_a.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
        });
        let b = bus.on_state_change(cb_b);
        let (seen_c, cb_c) = recorder();
        bus.on_state_change(cb_c);
        *slot.lock().unwrap() = Some(b);

        bus.publish(&Arc::new(1));
        bus.publish(&Arc::new(2));

        assert!(seen_b.lock().unwrap().is_empty());
        assert_eq!(*seen_c.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn self_unsubscribe_during_publish_keeps_others() {
        let bus = bus();
        let (seen_a, cb_a) = recorder();
        bus.on_state_change(cb_a);

        let own: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let own_in_cb = Arc::clone(&own);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_cb = Arc::clone(&hits);
        let handle = bus.on_state_change(move |_: &Arc<u32>| {
            hits_in_cb.fetch_add(1, Ordering::SeqCst);
            if let Some(h) = own_in_cb.lock().unwrap().as_ref() {
                h.unsubscribe();
            }
        });
        *own.lock().unwrap() = Some(handle);
        let (seen_c, cb_c) = recorder();
        bus.on_state_change(cb_c);

        bus.publish(&Arc::new(1));
        bus.publish(&Arc::new(2));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_a.lock().unwrap(), vec![1, 2]);
        assert_eq!(*seen_c.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn subscriber_added_during_publish_waits_for_next_snapshot() {
        let bus = bus();
        let (seen_late, cb_late) = recorder();
        let late = Arc::new(Mutex::new(Some(cb_late)));
        let bus_in_cb = bus.clone();
        bus.on_state_change(move |_: &Arc<u32>| {
            if let Some(cb) = late.lock().unwrap().take() {
                bus_in_cb.on_state_change(cb);
            }
        });

        bus.publish(&Arc::new(1));
        bus.publish(&Arc::new(2));

        assert_eq!(*seen_late.lock().unwrap(), vec![2]);
    }

    #[test]
    fn disposed_bus_rejects_subscriptions_and_releases_entries() {
        let bus = bus();
        let (seen, cb) = recorder();
        let handle = bus.on_state_change(cb);

        bus.dispose();
        assert!(bus.is_disposed());
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!handle.is_active());

        let (_, late) = recorder();
        let inert = bus.on_state_change(late);
        assert!(!inert.is_active());
        assert_eq!(bus.subscriber_count(), 0);
        assert!(matches!(
            bus.try_on_state_change(|_: &Arc<u32>| {}),
            Err(CoreError::Disposed(_))
        ));

        assert_eq!(bus.publish(&Arc::new(1)).delivered, 0);
        assert!(seen.lock().unwrap().is_empty());
        handle.unsubscribe();
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let bus = bus();
        let (seen, cb) = recorder();
        {
            let _guard = bus.on_state_change(cb).guard();
            bus.publish(&Arc::new(1));
        }
        bus.publish(&Arc::new(2));
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn handle_outliving_bus_is_harmless() {
        let bus = bus();
        let handle = bus.on_state_change(|_: &Arc<u32>| {});
        assert!(handle.is_active());
        drop(bus);
        assert!(!handle.is_active());
        handle.unsubscribe();
    }
}
