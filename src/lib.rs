//! Attribute-synchronization core for TMC integration test harnesses.
//!
//! This library drives a constellation of remote control-system devices
//! through command sequences and blocks test code until a set of attribute
//! transitions (`obsState`, `State`, `healthState`, ...) has been observed,
//! with timeout and failure-aggregation semantics.
//!
//! The pieces, leaves first:
//!
//! - [`value`] / [`states`]: normalized attribute values and the attribute
//!   decode registry.
//! - [`device`]: the opaque capability set a remote device must provide;
//!   [`sim`] is the in-process test double.
//! - [`monitor`] / [`watcher`]: one wait-condition contract
//!   ([`condition::SyncCondition`]) with a polling backend and an
//!   event-driven backend.
//! - [`waiter`]: the composite coordinator translating named expectations
//!   ("telescope reached ON") into condition sets driven against one shared
//!   timeout.
//! - [`recorder`]: subscribe once, then ask "has this attribute reached
//!   value V within the last N events".
//! - [`config`]: simulation flags, wait strategy, timeout profiles and the
//!   injected role → device-name topology.

pub mod condition;
pub mod config;
pub mod device;
pub mod error;
pub mod monitor;
pub mod recorder;
pub mod sim;
pub mod states;
pub mod value;
pub mod waiter;
pub mod watcher;

/// Commonly used types, re-exported for test code.
pub mod prelude {
    pub use crate::condition::{Resolved, SyncCondition, WaitStrategy};
    pub use crate::config::{SyncSettings, Telescope, TimeoutProfile, Topology};
    pub use crate::device::{AttributeEvent, DeviceHandle, DeviceProxy, SubscriptionId};
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::monitor::Monitor;
    pub use crate::recorder::EventRecorder;
    pub use crate::sim::SimDevice;
    pub use crate::states::{DeviceState, HealthState, ObsState};
    pub use crate::value::{AttrCodec, AttrValue};
    pub use crate::waiter::Waiter;
    pub use crate::watcher::AttributeWatcher;
}
