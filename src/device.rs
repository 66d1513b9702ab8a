//! Device access abstraction.
//!
//! The wait core never talks to a control system directly; it borrows an
//! opaque capability set: read an attribute, invoke a command, subscribe to
//! change events. Real deployments implement [`DeviceProxy`] over the live
//! client runtime; tests use the in-process [`crate::sim::SimDevice`].
//!
//! Change events are fanned out over `tokio::sync::broadcast`, matching the
//! multi-consumer pattern the rest of the stack uses for measurement streams.

use crate::error::SyncResult;
use crate::value::AttrValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// A change event delivered for a subscribed attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeEvent {
    /// Device the event originated from
    pub device: String,
    /// Attribute name
    pub attribute: String,
    /// Normalized value carried by the event
    pub value: AttrValue,
    /// UTC timestamp assigned at emission
    pub timestamp: DateTime<Utc>,
}

impl AttributeEvent {
    /// Build an event stamped with the current time.
    pub fn now(device: impl Into<String>, attribute: impl Into<String>, value: AttrValue) -> Self {
        Self {
            device: device.into(),
            attribute: attribute.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Opaque identifier for one event subscription.
///
/// Invalidated out-of-band when a device restarts; callers must tolerate
/// `NotSubscribed` on teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Shared handle to a device proxy.
pub type DeviceHandle = Arc<dyn DeviceProxy>;

/// Receiver half of a change-event subscription.
pub type EventReceiver = broadcast::Receiver<AttributeEvent>;

/// The capability set the wait core needs from a remote device.
#[async_trait]
pub trait DeviceProxy: Send + Sync {
    /// Fully-qualified device name.
    fn name(&self) -> &str;

    /// Read the current value of an attribute.
    async fn read_attribute(&self, attribute: &str) -> SyncResult<AttrValue>;

    /// Invoke a named command, optionally with an argument.
    async fn command_inout(
        &self,
        command: &str,
        arg: Option<AttrValue>,
    ) -> SyncResult<AttrValue>;

    /// Subscribe to change events for an attribute.
    ///
    /// The current value is delivered as the first event, so a subscriber
    /// always sees a baseline even if the attribute never changes again.
    async fn subscribe(
        &self,
        attribute: &str,
    ) -> SyncResult<(SubscriptionId, EventReceiver)>;

    /// Tear down an event subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<()>;

    /// Current polling period configured for an attribute.
    async fn polling_period(&self, attribute: &str) -> SyncResult<Duration>;

    /// Reconfigure the polling period for an attribute.
    async fn set_polling_period(&self, attribute: &str, period: Duration) -> SyncResult<()>;
}
