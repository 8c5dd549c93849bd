use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// When queued state notifications are delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// `set_state` drains the notification queue before returning.
    #[default]
    Immediate,
    /// `set_state` only enqueues. The host calls `flush` once per tick.
    Deferred,
}

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Dispatch policy handed to every store created through the registry.
    pub dispatch: DispatchPolicy,
    /// Maximum number of lifecycle events kept in the registry history.
    pub lifecycle_history: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::Immediate,
            lifecycle_history: 256,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle_history == 0 {
            return Err(CoreError::InvalidConfig(
                "lifecycle_history must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
