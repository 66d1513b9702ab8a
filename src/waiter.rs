//! Composite wait coordinator.
//!
//! A [`Waiter`] translates a named high-level expectation ("telescope
//! reached ON", "subarray obsState became IDLE") into a set of conditions,
//! one per (device, attribute, target) triple, then drives them all to
//! completion against one shared timeout. Individual condition timeouts are
//! recorded and do not abort the sweep; every condition is always attempted
//! and a single aggregate error carries the full diagnostic trail, so
//! partial convergence across a distributed device tree stays visible.

use crate::condition::{SyncCondition, WaitStrategy};
use crate::config::Topology;
use crate::device::DeviceHandle;
use crate::error::{SyncError, SyncResult};
use crate::monitor::Monitor;
use crate::states::{DeviceState, ObsState};
use crate::value::AttrValue;
use crate::watcher::AttributeWatcher;
use std::time::Duration;
use tracing::{debug, info};

/// Attribute carrying the telescope-wide state roll-up on the central node.
const TELESCOPE_STATE: &str = "telescopeState";
/// Operational state attribute present on every device.
const STATE: &str = "State";
/// Observation state attribute of subarray-like devices.
const OBS_STATE: &str = "obsState";

/// Composite coordinator over a set of wait conditions.
///
/// Device handles are injected per role; scenario methods skip roles that
/// were not wired, so one `Waiter` type serves Mid and Low deployments with
/// different device constellations.
#[derive(Default)]
pub struct Waiter {
    strategy: WaitStrategy,
    central_node: Option<DeviceHandle>,
    subarray_nodes: Vec<DeviceHandle>,
    csp_master: Option<DeviceHandle>,
    sdp_master: Option<DeviceHandle>,
    mccs_master: Option<DeviceHandle>,
    csp_subarrays: Vec<DeviceHandle>,
    sdp_subarrays: Vec<DeviceHandle>,
    mccs_subarrays: Vec<DeviceHandle>,
    dish_leaf_nodes: Vec<DeviceHandle>,
    conditions: Vec<Box<dyn SyncCondition>>,
    /// One line per condition that resolved.
    pub success_log: Vec<String>,
    /// One line per condition that timed out.
    pub error_log: Vec<String>,
    /// Set once any condition in the sweep has timed out.
    pub timed_out: bool,
}

impl Waiter {
    /// Create a waiter with the given backend strategy and no devices wired.
    pub fn new(strategy: WaitStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Create a waiter with every role named in a topology table wired,
    /// resolving each device name to a handle through `connect`.
    pub fn from_topology<F>(topology: &Topology, strategy: WaitStrategy, mut connect: F) -> Self
    where
        F: FnMut(&str) -> DeviceHandle,
    {
        let mut waiter = Self::new(strategy);
        if let Some(name) = &topology.central_node {
            waiter = waiter.with_central_node(connect(name));
        }
        for name in &topology.subarray_nodes {
            waiter = waiter.with_subarray_node(connect(name));
        }
        if let Some(name) = &topology.csp_master {
            waiter = waiter.with_csp_master(connect(name));
        }
        if let Some(name) = &topology.sdp_master {
            waiter = waiter.with_sdp_master(connect(name));
        }
        if let Some(name) = &topology.mccs_master {
            waiter = waiter.with_mccs_master(connect(name));
        }
        for name in &topology.csp_subarrays {
            waiter = waiter.with_csp_subarray(connect(name));
        }
        for name in &topology.sdp_subarrays {
            waiter = waiter.with_sdp_subarray(connect(name));
        }
        for name in &topology.mccs_subarrays {
            waiter = waiter.with_mccs_subarray(connect(name));
        }
        for name in &topology.dish_leaf_nodes {
            waiter = waiter.with_dish_leaf_node(connect(name));
        }
        waiter
    }

    /// Wire the central node.
    pub fn with_central_node(mut self, device: DeviceHandle) -> Self {
        self.central_node = Some(device);
        self
    }

    /// Wire a TMC subarray node.
    pub fn with_subarray_node(mut self, device: DeviceHandle) -> Self {
        self.subarray_nodes.push(device);
        self
    }

    /// Wire the CSP master.
    pub fn with_csp_master(mut self, device: DeviceHandle) -> Self {
        self.csp_master = Some(device);
        self
    }

    /// Wire the SDP master.
    pub fn with_sdp_master(mut self, device: DeviceHandle) -> Self {
        self.sdp_master = Some(device);
        self
    }

    /// Wire the MCCS master.
    pub fn with_mccs_master(mut self, device: DeviceHandle) -> Self {
        self.mccs_master = Some(device);
        self
    }

    /// Wire a CSP subarray.
    pub fn with_csp_subarray(mut self, device: DeviceHandle) -> Self {
        self.csp_subarrays.push(device);
        self
    }

    /// Wire an SDP subarray.
    pub fn with_sdp_subarray(mut self, device: DeviceHandle) -> Self {
        self.sdp_subarrays.push(device);
        self
    }

    /// Wire an MCCS subarray.
    pub fn with_mccs_subarray(mut self, device: DeviceHandle) -> Self {
        self.mccs_subarrays.push(device);
        self
    }

    /// Wire a dish leaf node.
    pub fn with_dish_leaf_node(mut self, device: DeviceHandle) -> Self {
        self.dish_leaf_nodes.push(device);
        self
    }

    /// Number of conditions currently queued.
    pub fn pending(&self) -> usize {
        self.conditions.len()
    }

    async fn push(&mut self, device: DeviceHandle, attribute: &str, target: AttrValue) {
        let condition: Box<dyn SyncCondition> = match self.strategy {
            WaitStrategy::Polling { resolution } => Box::new(
                Monitor::watch(device, attribute)
                    .await
                    .target(target)
                    .resolution(resolution),
            ),
            WaitStrategy::Events => {
                Box::new(AttributeWatcher::watch(device, attribute).target(target))
            }
        };
        debug!(condition = %condition.describe(), "condition queued");
        self.conditions.push(condition);
    }

    fn masters(&self) -> Vec<DeviceHandle> {
        [&self.csp_master, &self.sdp_master, &self.mccs_master]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn subarray_like(&self) -> Vec<DeviceHandle> {
        self.subarray_nodes
            .iter()
            .chain(&self.csp_subarrays)
            .chain(&self.sdp_subarrays)
            .chain(&self.mccs_subarrays)
            .cloned()
            .collect()
    }

    async fn expect_telescope_state(&mut self, state: DeviceState) {
        if let Some(central) = self.central_node.clone() {
            self.push(central, TELESCOPE_STATE, state.into()).await;
        }
        for device in self.masters() {
            self.push(device, STATE, state.into()).await;
        }
        for device in self.dish_leaf_nodes.clone() {
            self.push(device, STATE, state.into()).await;
        }
    }

    async fn expect_obs_state(&mut self, state: ObsState) {
        for device in self.subarray_like() {
            self.push(device, OBS_STATE, state.into()).await;
        }
    }

    /// Expect the telescope to reach ON across the control tree.
    pub async fn set_wait_for_telescope_on(&mut self) {
        self.expect_telescope_state(DeviceState::On).await;
    }

    /// Expect the telescope to reach OFF across the control tree.
    pub async fn set_wait_for_telescope_off(&mut self) {
        self.expect_telescope_state(DeviceState::Off).await;
    }

    /// Expect the telescope to reach STANDBY across the control tree.
    pub async fn set_wait_for_telescope_standby(&mut self) {
        self.expect_telescope_state(DeviceState::Standby).await;
    }

    /// Expect resource assignment to complete (obsState IDLE).
    pub async fn set_wait_for_assign_resources(&mut self) {
        self.expect_obs_state(ObsState::Idle).await;
    }

    /// Expect resource release to complete (obsState EMPTY).
    pub async fn set_wait_for_release_resources(&mut self) {
        self.expect_obs_state(ObsState::Empty).await;
    }

    /// Expect configuration to complete (obsState READY).
    pub async fn set_wait_for_configure(&mut self) {
        self.expect_obs_state(ObsState::Ready).await;
    }

    /// Expect a scan to be in progress (obsState SCANNING).
    pub async fn set_wait_for_scan(&mut self) {
        self.expect_obs_state(ObsState::Scanning).await;
    }

    /// Expect End to complete (obsState IDLE).
    pub async fn set_wait_for_go_to_idle(&mut self) {
        self.expect_obs_state(ObsState::Idle).await;
    }

    /// Expect an abort to complete (obsState ABORTED).
    pub async fn set_wait_for_abort(&mut self) {
        self.expect_obs_state(ObsState::Aborted).await;
    }

    /// Expect an arbitrary obsState on an arbitrary device list.
    pub async fn set_wait_for_specific_obs_state(
        &mut self,
        state: ObsState,
        devices: &[DeviceHandle],
    ) {
        for device in devices {
            self.push(device.clone(), OBS_STATE, state.into()).await;
        }
    }

    /// Drive every queued condition to completion against one shared
    /// timeout.
    ///
    /// Conditions are drained in reverse insertion order (incidental, not
    /// semantic). A condition timing out is recorded and does not stop the
    /// sweep; after all conditions have been attempted, one aggregate
    /// [`SyncError::WaitFailed`] is raised if any failed, carrying both the
    /// failure and success logs.
    pub async fn wait(&mut self, timeout: Duration) -> SyncResult<()> {
        while let Some(mut condition) = self.conditions.pop() {
            let summary = condition.describe();
            match condition.resolve(timeout).await {
                Ok(resolved) => {
                    self.success_log
                        .push(format!("{summary} met in {:?}", resolved.elapsed));
                }
                Err(err) => {
                    self.timed_out = true;
                    self.error_log.push(err.to_string());
                }
            }
        }
        if self.timed_out {
            return Err(SyncError::WaitFailed {
                failures: self.error_log.clone(),
                successes: self.success_log.clone(),
            });
        }
        info!(
            conditions = self.success_log.len(),
            "all wait conditions met"
        );
        Ok(())
    }
}
