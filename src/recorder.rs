//! Change-event recorder.
//!
//! [`EventRecorder`] is the higher-level helper step implementations lean
//! on: subscribe once per (device, attribute), let a background task drain
//! events into a bounded ring, then ask "has this attribute reached value V
//! within the last N events". Queries return booleans rather than raising on
//! mismatch; querying an attribute that was never subscribed is a usage
//! error and is surfaced immediately.

use crate::device::{AttributeEvent, DeviceHandle, SubscriptionId};
use crate::error::{SyncError, SyncResult};
use crate::value::AttrValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of most-recent events a query scans.
pub const DEFAULT_LOOKAHEAD: usize = 7;

/// Maximum events retained per subscription.
const RING_CAPACITY: usize = 64;

struct Entry {
    device: DeviceHandle,
    subscription: SubscriptionId,
    events: Arc<Mutex<VecDeque<AttributeEvent>>>,
    drain: JoinHandle<()>,
    /// Budget for [`EventRecorder::wait_until_change_event`].
    timeout: Duration,
}

/// Records change events per (device, attribute) pair.
#[derive(Default)]
pub struct EventRecorder {
    entries: HashMap<(String, String), Entry>,
}

fn key(device: &str, attribute: &str) -> (String, String) {
    (
        device.to_ascii_lowercase(),
        attribute.to_ascii_lowercase(),
    )
}

impl EventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change events for `(device, attribute)`.
    ///
    /// Reuses the existing subscription when one is already recorded for the
    /// pair. `timeout` is the budget later used by
    /// [`EventRecorder::wait_until_change_event`].
    pub async fn subscribe_event(
        &mut self,
        device: DeviceHandle,
        attribute: &str,
        timeout: Duration,
    ) -> SyncResult<()> {
        let key = key(device.name(), attribute);
        if self.entries.contains_key(&key) {
            debug!(
                device = device.name(),
                attribute, "already subscribed, reusing"
            );
            return Ok(());
        }
        let (subscription, mut rx) = device.subscribe(attribute).await?;
        let events = Arc::new(Mutex::new(VecDeque::new()));
        let ring = Arc::clone(&events);
        let drain = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let mut ring = ring.lock().await;
                        ring.push_back(event);
                        while ring.len() > RING_CAPACITY {
                            ring.pop_front();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event recorder lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.entries.insert(
            key,
            Entry {
                device,
                subscription,
                events,
                drain,
                timeout,
            },
        );
        Ok(())
    }

    fn entry(&self, device: &str, attribute: &str) -> SyncResult<&Entry> {
        self.entries
            .get(&key(device, attribute))
            .ok_or_else(|| SyncError::NotSubscribed {
                device: device.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Has a change event for `(device, attribute)` carried `expected`
    /// within the last `lookahead` events?
    ///
    /// Mismatch is an answer, not an error; only querying an unsubscribed
    /// attribute raises.
    pub async fn has_change_event_occurred(
        &self,
        device: &str,
        attribute: &str,
        expected: &AttrValue,
        lookahead: usize,
    ) -> SyncResult<bool> {
        let entry = self.entry(device, attribute)?;
        let events = entry.events.lock().await;
        Ok(events
            .iter()
            .rev()
            .take(lookahead)
            .any(|event| event.value.matches(expected)))
    }

    /// Variant accepting a set of acceptable values; the attribute name on
    /// each event is matched case-insensitively.
    pub async fn has_change_event_occurred_for_given_values(
        &self,
        device: &str,
        attribute: &str,
        accepted: &[AttrValue],
        lookahead: usize,
    ) -> SyncResult<bool> {
        let entry = self.entry(device, attribute)?;
        let events = entry.events.lock().await;
        Ok(events
            .iter()
            .rev()
            .take(lookahead)
            .filter(|event| event.attribute.eq_ignore_ascii_case(attribute))
            .any(|event| accepted.iter().any(|value| event.value.matches(value))))
    }

    /// Poll the recorded events until one matching `expected` shows up or
    /// the budget given at subscription time runs out.
    pub async fn wait_until_change_event(
        &self,
        device: &str,
        attribute: &str,
        expected: &AttrValue,
    ) -> SyncResult<bool> {
        let budget = self.entry(device, attribute)?.timeout;
        let tick = Duration::from_millis(50);
        let mut remaining = budget;
        loop {
            if self
                .has_change_event_occurred(device, attribute, expected, DEFAULT_LOOKAHEAD)
                .await?
            {
                return Ok(true);
            }
            if remaining < tick {
                return Ok(false);
            }
            tokio::time::sleep(tick).await;
            remaining = remaining.saturating_sub(tick);
        }
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.entries.len()
    }

    /// Unsubscribe everything and reset internal state.
    ///
    /// "Already unsubscribed" failures are tolerated as no-ops, since device
    /// restarts can invalidate subscription ids out-of-band.
    pub async fn clear_events(&mut self) {
        for ((device, attribute), entry) in self.entries.drain() {
            entry.drain.abort();
            match entry.device.unsubscribe(entry.subscription).await {
                Ok(()) => {}
                Err(SyncError::NotSubscribed { .. }) => {
                    debug!(%device, %attribute, "subscription already gone");
                }
                Err(err) => {
                    warn!(%device, %attribute, %err, "unsubscribe failed");
                }
            }
        }
    }
}
