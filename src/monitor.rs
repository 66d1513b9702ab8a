//! Polling-backed wait condition.
//!
//! A [`Monitor`] wraps one (device, attribute) pair, captures a baseline
//! value at construction, and re-reads the attribute at a fixed resolution
//! until its condition is met or the countdown runs out. Transient read
//! failures (a device restarting mid-wait) are logged and retried within the
//! budget rather than propagated, since the condition may still resolve once
//! the device comes back.

use crate::condition::{Predicate, Resolved, SyncCondition};
use crate::device::DeviceHandle;
use crate::error::{SyncError, SyncResult};
use crate::value::AttrValue;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

/// Polling condition on a single device attribute.
pub struct Monitor {
    device: DeviceHandle,
    attribute: String,
    previous: Option<AttrValue>,
    target: Option<AttrValue>,
    predicate: Option<Predicate>,
    require_transition: bool,
    resolution: Duration,
    /// Latched once a value differing from the baseline has been observed.
    changed: bool,
    last_seen: Option<AttrValue>,
}

impl Monitor {
    /// Start monitoring an attribute, capturing the current value as the
    /// baseline. A failed baseline read is tolerated; the first successful
    /// poll seeds the baseline instead.
    pub async fn watch(device: DeviceHandle, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let previous = match device.read_attribute(&attribute).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    device = device.name(),
                    %attribute, %err,
                    "baseline read failed, first poll will seed it"
                );
                None
            }
        };
        Self {
            device,
            attribute,
            previous,
            target: None,
            predicate: None,
            require_transition: false,
            resolution: DEFAULT_RESOLUTION,
            changed: false,
            last_seen: None,
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

    /// Require at least one change away from the baseline before the
    /// condition can be satisfied, even if the attribute already equals the
    /// target. Models "did the command actually cause a transition".
    pub fn require_transition(mut self) -> Self {
        self.require_transition = true;
        self
    }

    /// Override the polling resolution.
    pub fn resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    fn satisfied_by(&mut self, current: &AttrValue) -> bool {
        if self.previous.is_none() {
            self.previous = Some(current.clone());
        }
        let differs = self
            .previous
            .as_ref()
            .is_some_and(|previous| !previous.matches(current));
        if differs {
            self.changed = true;
        }
        if self.require_transition && !self.changed {
            return false;
        }
        match &self.target {
            Some(target) => match &self.predicate {
                Some(predicate) => predicate(current, target),
                None => current.matches(target),
            },
            // No target: any observed change suffices.
            None => self.changed,
        }
    }

    fn display(value: &Option<AttrValue>) -> String {
        value
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }

    fn timeout_error(&self, elapsed: Duration) -> SyncError {
        SyncError::ConditionTimeout {
            device: self.device.name().to_string(),
            attribute: self.attribute.clone(),
            previous: Self::display(&self.previous),
            desired: self
                .target
                .as_ref()
                .map_or_else(|| "any change".to_string(), ToString::to_string),
            current: Self::display(&self.last_seen),
            elapsed,
        }
    }

    /// Poll the attribute at `resolution` intervals until the condition is
    /// met, returning the unused portion of the timeout budget. Raises a
    /// descriptive timeout error when the countdown reaches zero first.
    pub async fn wait_until_conditions_met(
        &mut self,
        timeout: Duration,
        resolution: Duration,
    ) -> SyncResult<Duration> {
        let started = Instant::now();
        let mut remaining = timeout;
        loop {
            match self.device.read_attribute(&self.attribute).await {
                Ok(current) => {
                    let met = self.satisfied_by(&current);
                    self.last_seen = Some(current);
                    if met {
                        debug!(
                            device = self.device.name(),
                            attribute = %self.attribute,
                            elapsed = ?started.elapsed(),
                            "condition met"
                        );
                        return Ok(remaining);
                    }
                }
                Err(err) => {
                    // Transient failure (device restart); keep polling.
                    warn!(
                        device = self.device.name(),
                        attribute = %self.attribute,
                        %err,
                        "attribute read failed, retrying"
                    );
                }
            }
            if remaining < resolution {
                return Err(self.timeout_error(started.elapsed()));
            }
            tokio::time::sleep(resolution).await;
            remaining = remaining.saturating_sub(resolution);
        }
    }
}

#[async_trait]
impl SyncCondition for Monitor {
    fn describe(&self) -> String {
        format!(
            "{}/{}: {} -> {}",
            self.device.name(),
            self.attribute,
            Self::display(&self.previous),
            self.target
                .as_ref()
                .map_or_else(|| "any change".to_string(), ToString::to_string),
        )
    }

    async fn resolve(&mut self, timeout: Duration) -> SyncResult<Resolved> {
        let started = Instant::now();
        let resolution = self.resolution;
        self.wait_until_conditions_met(timeout, resolution).await?;
        Ok(Resolved {
            elapsed: started.elapsed(),
        })
    }
}
