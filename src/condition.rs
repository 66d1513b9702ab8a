//! The unified wait-condition contract.
//!
//! One (device, attribute) expectation can be driven two ways: by polling
//! reads ([`crate::monitor::Monitor`]) or by change-event subscription
//! ([`crate::watcher::AttributeWatcher`]). Both backends satisfy the same
//! contract behind [`SyncCondition`]; the [`WaitStrategy`] chosen in
//! configuration decides which one a [`crate::waiter::Waiter`] materializes.

use crate::error::SyncResult;
use crate::value::AttrValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a current value satisfies a target value.
///
/// Defaults to [`AttrValue::matches`] when none is supplied.
pub type Predicate = Arc<dyn Fn(&AttrValue, &AttrValue) -> bool + Send + Sync>;

/// Outcome of a successfully resolved condition.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// Time the condition took to resolve
    pub elapsed: Duration,
}

/// A single attribute expectation that can be driven to completion.
#[async_trait]
pub trait SyncCondition: Send {
    /// One-line summary: device, attribute, baseline and target.
    fn describe(&self) -> String;

    /// Drive the condition to completion within `timeout`.
    ///
    /// Returns [`Resolved`] on success or a descriptive
    /// [`crate::error::SyncError::ConditionTimeout`] on failure. Cleanup
    /// (unsubscribing, restoring polling) always happens before returning,
    /// on both paths.
    async fn resolve(&mut self, timeout: Duration) -> SyncResult<Resolved>;
}

/// Backend selection for wait conditions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Re-read the attribute at a fixed resolution.
    Polling {
        /// Interval between reads
        #[serde(with = "humantime_serde")]
        resolution: Duration,
    },
    /// Subscribe to change events and block on a completion signal.
    Events,
}

impl WaitStrategy {
    /// Polling at the conventional 100 ms resolution.
    pub fn polling() -> Self {
        WaitStrategy::Polling {
            resolution: Duration::from_millis(100),
        }
    }
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::polling()
    }
}
