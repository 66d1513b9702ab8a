//! In-process simulated device.
//!
//! `SimDevice` is the test double used when no real control system is
//! deployed. It keeps an attribute map, fans change events out over one
//! broadcast channel per attribute, and carries the test-only surface the
//! simulators in this domain conventionally expose: `SetDirectObsState`,
//! `SetDefective`, and a programmable command → attribute-transition table.
//!
//! On subscription the current value is re-broadcast as a snapshot event so a
//! new subscriber always observes a baseline. Existing subscribers see that
//! snapshot too; it carries an unchanged value, which the wait machinery
//! treats as a no-op.

use crate::device::{AttributeEvent, DeviceProxy, EventReceiver, SubscriptionId};
use crate::error::{SyncError, SyncResult};
use crate::value::AttrValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_POLLING_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct SimState {
    attributes: HashMap<String, AttrValue>,
    channels: HashMap<String, broadcast::Sender<AttributeEvent>>,
    subscriptions: HashMap<u64, String>,
    next_subscription: u64,
    polling: HashMap<String, Duration>,
    transitions: HashMap<String, Vec<(String, AttrValue)>>,
    defective: bool,
    drop_subscriptions: bool,
}

/// Simulated device implementing [`DeviceProxy`].
pub struct SimDevice {
    name: String,
    state: Mutex<SimState>,
}

impl SimDevice {
    /// Create a simulated device with an empty attribute map.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Set an attribute value and fire a change event to all subscribers.
    pub async fn set_attribute(&self, attribute: &str, value: impl Into<AttrValue>) {
        let mut state = self.state.lock().await;
        Self::apply(&self.name, &mut state, attribute, value.into());
    }

    /// Program a command to apply attribute transitions when invoked.
    ///
    /// Each `(attribute, value)` pair is applied in order, firing one change
    /// event per pair, when [`DeviceProxy::command_inout`] runs the command.
    pub async fn on_command(&self, command: &str, effects: Vec<(String, AttrValue)>) {
        let mut state = self.state.lock().await;
        state.transitions.insert(command.to_string(), effects);
    }

    /// Mark the device defective: reads and commands fail until cleared.
    pub async fn set_defective(&self, defective: bool) {
        self.state.lock().await.defective = defective;
    }

    /// Make subsequent `unsubscribe` calls fail as if the subscription ids
    /// had been invalidated by a device restart.
    pub async fn invalidate_subscriptions(&self, invalid: bool) {
        self.state.lock().await.drop_subscriptions = invalid;
    }

    fn apply(device: &str, state: &mut SimState, attribute: &str, value: AttrValue) {
        let key = attribute.to_ascii_lowercase();
        state.attributes.insert(key.clone(), value.clone());
        if let Some(tx) = state.channels.get(&key) {
            // Send only fails when no receiver is alive, which is fine.
            let _ = tx.send(AttributeEvent::now(device, attribute, value));
        }
    }

    fn unavailable(&self, reason: &str) -> SyncError {
        SyncError::DeviceUnavailable {
            device: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DeviceProxy for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_attribute(&self, attribute: &str) -> SyncResult<AttrValue> {
        let state = self.state.lock().await;
        if state.defective {
            return Err(self.unavailable("device marked defective"));
        }
        state
            .attributes
            .get(&attribute.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| self.unavailable(&format!("attribute '{attribute}' not defined")))
    }

    async fn command_inout(
        &self,
        command: &str,
        arg: Option<AttrValue>,
    ) -> SyncResult<AttrValue> {
        let mut state = self.state.lock().await;
        match command {
            "SetDefective" => {
                state.defective = matches!(arg, Some(AttrValue::Bool(true)));
                return Ok(AttrValue::Bool(true));
            }
            _ if state.defective => {
                return Err(self.unavailable("device marked defective"));
            }
            "SetDirectObsState" => {
                let obs = arg
                    .as_ref()
                    .and_then(AttrValue::as_obs_state)
                    .ok_or_else(|| SyncError::AttributeDecode {
                        attribute: "obsState".to_string(),
                        reason: format!("SetDirectObsState argument {arg:?} is not an obsState"),
                    })?;
                Self::apply(&self.name, &mut state, "obsState", AttrValue::Obs(obs));
                return Ok(AttrValue::Bool(true));
            }
            _ => {}
        }
        if let Some(effects) = state.transitions.get(command).cloned() {
            debug!(device = %self.name, command, "applying programmed transitions");
            for (attribute, value) in effects {
                Self::apply(&self.name, &mut state, &attribute, value);
            }
        }
        Ok(AttrValue::Bool(true))
    }

    async fn subscribe(
        &self,
        attribute: &str,
    ) -> SyncResult<(SubscriptionId, EventReceiver)> {
        let mut state = self.state.lock().await;
        let key = attribute.to_ascii_lowercase();
        let tx = state
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone();
        let rx = tx.subscribe();
        // Snapshot event: deliver the current value as the first event.
        if let Some(current) = state.attributes.get(&key).cloned() {
            let _ = tx.send(AttributeEvent::now(&self.name, attribute, current));
        }
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions.insert(id, key);
        Ok((SubscriptionId(id), rx))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        if state.drop_subscriptions {
            return Err(SyncError::NotSubscribed {
                device: self.name.clone(),
                attribute: state
                    .subscriptions
                    .remove(&id.0)
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
        match state.subscriptions.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(SyncError::NotSubscribed {
                device: self.name.clone(),
                attribute: "unknown".to_string(),
            }),
        }
    }

    async fn polling_period(&self, attribute: &str) -> SyncResult<Duration> {
        let state = self.state.lock().await;
        Ok(state
            .polling
            .get(&attribute.to_ascii_lowercase())
            .copied()
            .unwrap_or(DEFAULT_POLLING_PERIOD))
    }

    async fn set_polling_period(&self, attribute: &str, period: Duration) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        state
            .polling
            .insert(attribute.to_ascii_lowercase(), period);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{DeviceState, ObsState};

    #[tokio::test]
    async fn read_back_set_attribute() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("State", DeviceState::On).await;
        let value = dev.read_attribute("state").await.unwrap();
        assert_eq!(value, AttrValue::State(DeviceState::On));
    }

    #[tokio::test]
    async fn subscribe_delivers_snapshot_then_changes() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("obsState", ObsState::Empty).await;
        let (_id, mut rx) = dev.subscribe("obsState").await.unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.value, AttrValue::Obs(ObsState::Empty));

        dev.set_attribute("obsState", ObsState::Idle).await;
        let change = rx.recv().await.unwrap();
        assert_eq!(change.value, AttrValue::Obs(ObsState::Idle));
    }

    #[tokio::test]
    async fn defective_device_refuses_reads_and_commands() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("State", DeviceState::On).await;
        dev.command_inout("SetDefective", Some(AttrValue::Bool(true)))
            .await
            .unwrap();
        assert!(dev.read_attribute("State").await.is_err());
        assert!(dev.command_inout("On", None).await.is_err());

        dev.command_inout("SetDefective", Some(AttrValue::Bool(false)))
            .await
            .unwrap();
        assert!(dev.read_attribute("State").await.is_ok());
    }

    #[tokio::test]
    async fn set_direct_obs_state_fires_event() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("obsState", ObsState::Empty).await;
        let (_id, mut rx) = dev.subscribe("obsState").await.unwrap();
        let _snapshot = rx.recv().await.unwrap();

        dev.command_inout("SetDirectObsState", Some(AttrValue::from("ABORTED")))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.value, AttrValue::Obs(ObsState::Aborted));
    }

    #[tokio::test]
    async fn programmed_command_applies_transitions() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("State", DeviceState::Standby).await;
        dev.on_command(
            "On",
            vec![("State".to_string(), AttrValue::State(DeviceState::On))],
        )
        .await;

        dev.command_inout("On", None).await.unwrap();
        let value = dev.read_attribute("State").await.unwrap();
        assert_eq!(value, AttrValue::State(DeviceState::On));
    }

    #[tokio::test]
    async fn unsubscribe_twice_reports_not_subscribed() {
        let dev = SimDevice::new("sim/test/1");
        dev.set_attribute("obsState", ObsState::Empty).await;
        let (id, _rx) = dev.subscribe("obsState").await.unwrap();
        dev.unsubscribe(id).await.unwrap();
        assert!(matches!(
            dev.unsubscribe(id).await,
            Err(SyncError::NotSubscribed { .. })
        ));
    }
}
