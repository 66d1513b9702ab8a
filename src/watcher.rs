//! Event-backed wait condition.
//!
//! [`AttributeWatcher`] satisfies the same contract as
//! [`crate::monitor::Monitor`] but is driven by a change-event subscription
//! instead of polling. Events are consumed on a background task; the waiting
//! caller blocks on a completion signal. Lifecycle:
//! `idle → subscribed → (waiting) → satisfied | timed_out`.
//!
//! A watcher is single-owner and not meant to be reused across separate
//! waits.

use crate::condition::{Predicate, Resolved, SyncCondition};
use crate::device::{DeviceHandle, SubscriptionId};
use crate::error::{SyncError, SyncResult};
use crate::value::AttrValue;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Default)]
struct WatchState {
    /// Seeded by the very first event; events before subscription are not a
    /// meaningful baseline.
    previous: Option<AttrValue>,
    current: Option<AttrValue>,
    changed: bool,
    satisfied: bool,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

struct Shared {
    state: Mutex<WatchState>,
    done: Notify,
}

struct Listener {
    handle: JoinHandle<()>,
    subscription: SubscriptionId,
    restore_polling: Option<Duration>,
}

/// Event-driven condition on a single device attribute.
pub struct AttributeWatcher {
    device: DeviceHandle,
    attribute: String,
    target: Option<AttrValue>,
    predicate: Option<Predicate>,
    require_transition: bool,
    tuned_polling: Option<Duration>,
    shared: Arc<Shared>,
    listener: Option<Listener>,
}

impl AttributeWatcher {
    /// Create an idle watcher for an attribute. No subscription happens
    /// until [`AttributeWatcher::start_listening`] (or the first `wait`).
    pub fn watch(device: DeviceHandle, attribute: impl Into<String>) -> Self {
        Self {
            device,
            attribute: attribute.into(),
            target: None,
            predicate: None,
            require_transition: false,
            tuned_polling: None,
            shared: Arc::new(Shared {
                state: Mutex::new(WatchState::default()),
                done: Notify::new(),
            }),
            listener: None,
        }
    }

    /// Set the value the attribute must reach.
    pub fn target(mut self, value: impl Into<AttrValue>) -> Self {
        self.target = Some(value.into());
        self
    }

    /// Replace the default equality check with a custom predicate.
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Require at least one change away from the first-seen value before the
    /// condition can be satisfied. The very first event can never satisfy a
    /// transition-requiring watcher, since no transition has been observed
    /// relative to itself as baseline.
    pub fn require_transition(mut self) -> Self {
        self.require_transition = true;
        self
    }

    /// Tighten the device's polling period while listening; the original
    /// period is restored when listening stops.
    pub fn tuned_polling(mut self, period: Duration) -> Self {
        self.tuned_polling = Some(period);
        self
    }

    /// Subscribe to change events and start consuming them.
    ///
    /// Idempotent while already listening.
    pub async fn start_listening(&mut self) -> SyncResult<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let restore_polling = match self.tuned_polling {
            Some(tuned) => {
                let original = self.device.polling_period(&self.attribute).await?;
                self.device.set_polling_period(&self.attribute, tuned).await?;
                Some(original)
            }
            None => None,
        };
        let (subscription, mut rx) = self.device.subscribe(&self.attribute).await?;
        debug!(
            device = self.device.name(),
            attribute = %self.attribute,
            "subscribed to change events"
        );

        let shared = Arc::clone(&self.shared);
        let attribute = self.attribute.clone();
        let target = self.target.clone();
        let predicate = self.predicate.clone();
        let require_transition = self.require_transition;
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !event.attribute.eq_ignore_ascii_case(&attribute) {
                            continue;
                        }
                        let satisfied = Self::apply(
                            &shared,
                            event.value,
                            target.as_ref(),
                            predicate.as_ref(),
                            require_transition,
                        )
                        .await;
                        if satisfied {
                            shared.done.notify_one();
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%attribute, missed, "event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.listener = Some(Listener {
            handle,
            subscription,
            restore_polling,
        });
        Ok(())
    }

    /// Feed one event value into the satisfaction logic. Returns true when
    /// the condition just became satisfied.
    async fn apply(
        shared: &Shared,
        value: AttrValue,
        target: Option<&AttrValue>,
        predicate: Option<&Predicate>,
        require_transition: bool,
    ) -> bool {
        let mut state = shared.state.lock().await;
        if state.satisfied {
            return false;
        }
        if state.previous.is_none() {
            state.previous = Some(value.clone());
            state.started = Some(Instant::now());
        }
        let differs = state
            .previous
            .as_ref()
            .is_some_and(|previous| !previous.matches(&value));
        if differs {
            state.changed = true;
        }
        state.current = Some(value);
        let met = match (target, &state.current) {
            (Some(target), Some(current)) => {
                let hit = match predicate {
                    Some(predicate) => predicate(current, target),
                    None => current.matches(target),
                };
                hit && (!require_transition || state.changed)
            }
            // No target: any change suffices.
            _ => state.changed,
        };
        if met {
            state.satisfied = true;
            state.elapsed = state.started.map(|s| s.elapsed());
        }
        met
    }

    /// Unsubscribe, stop the consumer task and restore the polling period.
    /// Tolerates subscriptions already invalidated out-of-band.
    pub async fn stop_listening(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        listener.handle.abort();
        match self.device.unsubscribe(listener.subscription).await {
            Ok(()) => {}
            Err(SyncError::NotSubscribed { .. }) => {
                debug!(
                    device = self.device.name(),
                    attribute = %self.attribute,
                    "subscription already gone"
                );
            }
            Err(err) => {
                warn!(
                    device = self.device.name(),
                    attribute = %self.attribute,
                    %err,
                    "unsubscribe failed"
                );
            }
        }
        if let Some(original) = listener.restore_polling {
            if let Err(err) = self
                .device
                .set_polling_period(&self.attribute, original)
                .await
            {
                warn!(
                    device = self.device.name(),
                    attribute = %self.attribute,
                    %err,
                    "could not restore polling period"
                );
            }
        }
    }

    fn display(value: &Option<AttrValue>) -> String {
        value
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }

    /// Block on the completion signal up to `timeout`.
    ///
    /// Starts listening first if the watcher is still idle. On both success
    /// and timeout, listening is stopped (unsubscribed, polling restored)
    /// before returning. Returns the time between the first event and
    /// satisfaction.
    pub async fn wait(&mut self, timeout: Duration) -> SyncResult<Duration> {
        self.start_listening().await?;

        let already = {
            let state = self.shared.state.lock().await;
            state.satisfied.then(|| state.elapsed.unwrap_or_default())
        };
        if let Some(elapsed) = already {
            self.stop_listening().await;
            return Ok(elapsed);
        }

        let shared = Arc::clone(&self.shared);
        let result = tokio::time::timeout(timeout, shared.done.notified()).await;
        match result {
            Ok(()) => {
                let elapsed = {
                    let state = self.shared.state.lock().await;
                    state.elapsed.unwrap_or_default()
                };
                self.stop_listening().await;
                Ok(elapsed)
            }
            Err(_) => {
                self.stop_listening().await;
                let state = self.shared.state.lock().await;
                Err(SyncError::ConditionTimeout {
                    device: self.device.name().to_string(),
                    attribute: self.attribute.clone(),
                    previous: Self::display(&state.previous),
                    desired: self
                        .target
                        .as_ref()
                        .map_or_else(|| "any change".to_string(), ToString::to_string),
                    current: Self::display(&state.current),
                    elapsed: timeout,
                })
            }
        }
    }
}

#[async_trait]
impl SyncCondition for AttributeWatcher {
    fn describe(&self) -> String {
        // Uncontended outside the consumer task's brief critical section;
        // before the first event the baseline is simply unknown.
        let previous = self
            .shared
            .state
            .try_lock()
            .ok()
            .and_then(|state| state.previous.clone());
        format!(
            "{}/{}: {} -> {}",
            self.device.name(),
            self.attribute,
            Self::display(&previous),
            self.target
                .as_ref()
                .map_or_else(|| "any change".to_string(), ToString::to_string),
        )
    }

    async fn resolve(&mut self, timeout: Duration) -> SyncResult<Resolved> {
        let started = Instant::now();
        self.wait(timeout).await?;
        Ok(Resolved {
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProxy;
    use crate::sim::SimDevice;
    use crate::states::{DeviceState, ObsState};

    #[tokio::test]
    async fn first_event_with_desired_value_completes_without_transition() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Idle).await;

        // The subscription snapshot is the first event and already matches.
        let mut watcher = AttributeWatcher::watch(dev, "obsState").target(ObsState::Idle);
        let started = Instant::now();
        watcher.wait(Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn first_event_cannot_satisfy_a_transition_requiring_watcher() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Idle).await;

        let mut watcher = AttributeWatcher::watch(dev, "obsState")
            .target(ObsState::Idle)
            .require_transition();
        let err = watcher.wait(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, SyncError::ConditionTimeout { .. }));
    }

    #[tokio::test]
    async fn transition_to_target_satisfies_transition_requiring_watcher() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Empty).await;

        let mut watcher = AttributeWatcher::watch(dev.clone(), "obsState")
            .target(ObsState::Idle)
            .require_transition();
        watcher.start_listening().await.unwrap();

        let driver = dev.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            driver.set_attribute("obsState", ObsState::Resourcing).await;
            driver.set_attribute("obsState", ObsState::Idle).await;
        });

        watcher.wait(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn no_target_completes_on_any_change() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("State", DeviceState::Off).await;

        let mut watcher = AttributeWatcher::watch(dev.clone(), "State");
        watcher.start_listening().await.unwrap();

        let driver = dev.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            driver.set_attribute("State", DeviceState::On).await;
        });

        watcher.wait(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn timeout_reports_previous_desired_and_current() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Empty).await;

        let mut watcher =
            AttributeWatcher::watch(dev, "obsState").target(ObsState::Ready);
        let err = watcher.wait(Duration::from_millis(150)).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("EMPTY"));
        assert!(msg.contains("READY"));
        assert!(msg.contains("obsState"));
    }

    #[tokio::test]
    async fn describe_reports_the_first_seen_value() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Empty).await;

        let mut watcher = AttributeWatcher::watch(dev, "obsState").target(ObsState::Ready);
        assert!(watcher.describe().contains("unknown -> READY"));

        let _ = watcher.wait(Duration::from_millis(150)).await.unwrap_err();
        // Same previous -> target shape as the polling backend.
        assert!(watcher.describe().contains("EMPTY -> READY"));
    }

    #[tokio::test]
    async fn polling_period_is_tuned_and_restored() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Idle).await;
        dev.set_polling_period("obsState", Duration::from_millis(1000))
            .await
            .unwrap();

        let mut watcher = AttributeWatcher::watch(dev.clone(), "obsState")
            .target(ObsState::Idle)
            .tuned_polling(Duration::from_millis(50));
        watcher.wait(Duration::from_secs(5)).await.unwrap();

        let period = dev.polling_period("obsState").await.unwrap();
        assert_eq!(period, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn stop_listening_tolerates_invalidated_subscription() {
        let dev = Arc::new(SimDevice::new("sim/subarray/1"));
        dev.set_attribute("obsState", ObsState::Idle).await;

        let mut watcher = AttributeWatcher::watch(dev.clone(), "obsState")
            .target(ObsState::Idle);
        watcher.start_listening().await.unwrap();
        dev.invalidate_subscriptions(true).await;

        // wait() succeeds and cleanup swallows the NotSubscribed error.
        watcher.wait(Duration::from_secs(5)).await.unwrap();
    }
}
