use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{CoreError, Result};
use crate::id::PluginId;

/// Plugin runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Registered; only the computed initial state may be read.
    Uninitialized,
    /// Initialized; capability available, state may change.
    Ready,
    /// Torn down; subscriptions rejected, resources released.
    Disposed,
}

impl PluginStatus {
    pub fn can_transition_to(self, to: PluginStatus) -> bool {
        matches!(
            (self, to),
            (Self::Uninitialized, Self::Ready)
                | (Self::Uninitialized, Self::Disposed)
                | (Self::Ready, Self::Disposed)
        )
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Live status of a single plugin, observable by readiness waiters.
#[derive(Debug)]
pub struct Lifecycle {
    id: PluginId,
    status: watch::Sender<PluginStatus>,
    reached_ready: AtomicBool,
}

impl Lifecycle {
    pub fn new(id: PluginId) -> Self {
        let (status, _) = watch::channel(PluginStatus::Uninitialized);
        Self {
            id,
            status,
            reached_ready: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn status(&self) -> PluginStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == PluginStatus::Ready
    }

    /// True once the plugin has been ready, and forever after.
    pub fn has_been_ready(&self) -> bool {
        self.reached_ready.load(Ordering::Acquire)
    }

    /// Move to `to`, returning the previous status.
    pub fn transition(&self, to: PluginStatus) -> Result<PluginStatus> {
        let mut outcome = Ok(PluginStatus::Uninitialized);
        self.status.send_if_modified(|current| {
            let from = *current;
            if from.can_transition_to(to) {
                if to == PluginStatus::Ready {
                    self.reached_ready.store(true, Ordering::Release);
                }
                *current = to;
                outcome = Ok(from);
                true
            } else {
                outcome = Err(CoreError::InvalidTransition {
                    id: self.id.clone(),
                    from,
                    to,
                });
                false
            }
        });
        outcome
    }

    /// Resolve once the plugin is ready. Fails if it is disposed first.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|s| *s != PluginStatus::Uninitialized)
            .await
            .map(|s| *s)
            .unwrap_or(PluginStatus::Disposed);
        match status {
            PluginStatus::Ready => Ok(()),
            _ => Err(CoreError::Disposed(self.id.clone())),
        }
    }
}

/// A lifecycle event for a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub plugin_id: PluginId,
    pub from_state: PluginStatus,
    pub to_state: PluginStatus,
    pub timestamp: String,
}

/// Bounded history of lifecycle transitions across all plugins.
#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    events: VecDeque<LifecycleEvent>,
    max_events: usize,
}

impl LifecycleTracker {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events: max_events.max(1),
        }
    }

    pub fn record(&mut self, plugin_id: &PluginId, from_state: PluginStatus, to_state: PluginStatus) {
        if self.events.len() == self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(LifecycleEvent {
            plugin_id: plugin_id.clone(),
            from_state,
            to_state,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn events(&self) -> impl Iterator<Item = &LifecycleEvent> {
        self.events.iter()
    }

    pub fn events_for(&self, plugin_id: &PluginId) -> Vec<&LifecycleEvent> {
        self.events
            .iter()
            .filter(|e| &e.plugin_id == plugin_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const P1: PluginId = PluginId::new("p1");

    #[test]
    fn test_initial_state() {
        let lifecycle = Lifecycle::new(P1);
        assert_eq!(lifecycle.status(), PluginStatus::Uninitialized);
        assert!(!lifecycle.is_ready());
    }

    #[test]
    fn test_transitions() {
        let lifecycle = Lifecycle::new(P1);
        assert_eq!(
            lifecycle.transition(PluginStatus::Ready).unwrap(),
            PluginStatus::Uninitialized
        );
        assert!(lifecycle.is_ready());
        assert_eq!(
            lifecycle.transition(PluginStatus::Disposed).unwrap(),
            PluginStatus::Ready
        );
        assert_eq!(lifecycle.status(), PluginStatus::Disposed);
        assert!(lifecycle.has_been_ready());
    }

    #[test]
    fn test_ready_happens_once() {
        let lifecycle = Lifecycle::new(P1);
        lifecycle.transition(PluginStatus::Ready).unwrap();
        let err = lifecycle.transition(PluginStatus::Ready).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition {
                id: P1,
                from: PluginStatus::Ready,
                to: PluginStatus::Ready,
            }
        );
    }

    #[test]
    fn test_disposed_is_terminal() {
        let lifecycle = Lifecycle::new(P1);
        lifecycle.transition(PluginStatus::Disposed).unwrap();
        assert!(!lifecycle.has_been_ready());
        assert!(lifecycle.transition(PluginStatus::Ready).is_err());
        assert!(lifecycle.transition(PluginStatus::Disposed).is_err());
    }

    #[test]
    fn test_events_tracking() {
        let mut tracker = LifecycleTracker::new(10);
        let p2 = PluginId::new("p2");
        tracker.record(&P1, PluginStatus::Uninitialized, PluginStatus::Ready);
        tracker.record(&P1, PluginStatus::Ready, PluginStatus::Disposed);
        tracker.record(&p2, PluginStatus::Uninitialized, PluginStatus::Disposed);

        let p1_events = tracker.events_for(&P1);
        assert_eq!(p1_events.len(), 2);
        assert_eq!(p1_events[0].from_state, PluginStatus::Uninitialized);
        assert_eq!(p1_events[0].to_state, PluginStatus::Ready);
        assert_eq!(p1_events[1].to_state, PluginStatus::Disposed);
        assert!(!p1_events[0].timestamp.is_empty());
        assert_eq!(tracker.events_for(&p2).len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = LifecycleTracker::new(2);
        for name in ["a", "b", "c"] {
            tracker.record(&PluginId::new(name), PluginStatus::Uninitialized, PluginStatus::Ready);
        }
        let ids: Vec<_> = tracker.events().map(|e| e.plugin_id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&PluginStatus::Uninitialized).unwrap();
        assert_eq!(json, "\"uninitialized\"");

        let parsed: PluginStatus = serde_json::from_str("\"disposed\"").unwrap();
        assert_eq!(parsed, PluginStatus::Disposed);
    }

    #[tokio::test]
    async fn test_wait_ready_resolves_after_transition() {
        let lifecycle = Arc::new(Lifecycle::new(P1));
        let waiter = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.wait_ready().await })
        };
        tokio::task::yield_now().await;
        lifecycle.transition(PluginStatus::Ready).unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_ready_fails_when_disposed_first() {
        let lifecycle = Lifecycle::new(P1);
        lifecycle.transition(PluginStatus::Disposed).unwrap();
        assert!(matches!(
            lifecycle.wait_ready().await,
            Err(CoreError::Disposed(_))
        ));
    }
}
