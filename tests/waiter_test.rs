//! Integration tests for the composite waiter against simulated devices.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tmc_sync::prelude::*;

fn fast_polling() -> WaitStrategy {
    WaitStrategy::Polling {
        resolution: Duration::from_millis(10),
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[tokio::test]
async fn telescope_on_resolves_promptly_when_devices_are_already_on() {
    init_tracing();
    let csp = Arc::new(SimDevice::new("mid-csp/elt/master"));
    let sdp = Arc::new(SimDevice::new("mid-sdp/elt/master"));
    csp.set_attribute("State", DeviceState::On).await;
    sdp.set_attribute("State", DeviceState::On).await;

    let mut waiter = Waiter::new(fast_polling())
        .with_csp_master(csp.clone())
        .with_sdp_master(sdp.clone());
    waiter.set_wait_for_telescope_on().await;
    assert_eq!(waiter.pending(), 2);

    let started = Instant::now();
    waiter.wait(Duration::from_secs(5)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(waiter.success_log.len(), 2);
    assert!(waiter.error_log.is_empty());
    assert!(!waiter.timed_out);
}

#[tokio::test]
async fn every_condition_is_attempted_and_failures_aggregate() {
    init_tracing();
    let good = Arc::new(SimDevice::new("mid-csp/elt/master"));
    let bad = Arc::new(SimDevice::new("mid-sdp/elt/master"));
    good.set_attribute("State", DeviceState::On).await;
    bad.set_attribute("State", DeviceState::Off).await;

    let mut waiter = Waiter::new(fast_polling())
        .with_csp_master(good.clone())
        .with_sdp_master(bad.clone());
    waiter.set_wait_for_telescope_on().await;

    let err = waiter.wait(Duration::from_millis(200)).await.unwrap_err();

    // The failing device did not stop the healthy one from being checked.
    assert!(waiter.timed_out);
    assert_eq!(waiter.success_log.len(), 1);
    assert_eq!(waiter.error_log.len(), 1);

    let msg = err.to_string();
    assert!(msg.contains("mid-sdp/elt/master"));
    assert!(msg.contains("mid-csp/elt/master"));
    assert!(matches!(err, SyncError::WaitFailed { .. }));
}

#[tokio::test]
async fn assign_resources_converges_across_subarrays_with_events() {
    init_tracing();
    let tmc = Arc::new(SimDevice::new("ska_low/tm_subarray_node/1"));
    let csp = Arc::new(SimDevice::new("low-csp/subarray/01"));
    let sdp = Arc::new(SimDevice::new("low-sdp/subarray/01"));
    for dev in [&tmc, &csp, &sdp] {
        dev.set_attribute("obsState", ObsState::Empty).await;
    }

    let mut waiter = Waiter::new(WaitStrategy::Events)
        .with_subarray_node(tmc.clone())
        .with_csp_subarray(csp.clone())
        .with_sdp_subarray(sdp.clone());
    waiter.set_wait_for_assign_resources().await;
    assert_eq!(waiter.pending(), 3);

    for dev in [tmc.clone(), csp.clone(), sdp.clone()] {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dev.set_attribute("obsState", ObsState::Resourcing).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            dev.set_attribute("obsState", ObsState::Idle).await;
        });
    }

    waiter.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(waiter.success_log.len(), 3);
}

#[tokio::test]
async fn topology_roles_wire_through_the_bridging_constructor() {
    init_tracing();
    let mut devices: Vec<Arc<SimDevice>> = Vec::new();
    let mut waiter = Waiter::from_topology(&Topology::mid(), fast_polling(), |name| {
        let dev = Arc::new(SimDevice::new(name));
        devices.push(dev.clone());
        dev
    });
    for dev in &devices {
        dev.set_attribute("State", DeviceState::On).await;
        dev.set_attribute("telescopeState", DeviceState::On).await;
    }

    waiter.set_wait_for_telescope_on().await;
    // Central node, CSP and SDP masters, four dish leaf nodes.
    assert_eq!(waiter.pending(), 7);

    waiter.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(waiter.success_log.len(), 7);
}

#[tokio::test]
async fn absent_roles_are_skipped() {
    init_tracing();
    let mut waiter = Waiter::new(fast_polling());
    waiter.set_wait_for_telescope_on().await;
    waiter.set_wait_for_abort().await;
    assert_eq!(waiter.pending(), 0);

    // Nothing queued, nothing to fail.
    waiter.wait(Duration::from_millis(50)).await.unwrap();
    assert!(!waiter.timed_out);
}

#[tokio::test]
async fn specific_obs_state_on_an_arbitrary_device_list() {
    init_tracing();
    let topology = Topology::low();
    let csp = Arc::new(SimDevice::new(topology.csp_subarrays[0].clone()));
    let mccs = Arc::new(SimDevice::new(topology.mccs_subarrays[0].clone()));
    csp.set_attribute("obsState", ObsState::Aborting).await;
    mccs.set_attribute("obsState", ObsState::Aborting).await;

    let devices: Vec<DeviceHandle> = vec![csp.clone(), mccs.clone()];
    let mut waiter = Waiter::new(fast_polling());
    waiter
        .set_wait_for_specific_obs_state(ObsState::Aborted, &devices)
        .await;

    for dev in [csp, mccs] {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            dev.set_attribute("obsState", ObsState::Aborted).await;
        });
    }

    waiter.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(waiter.success_log.len(), 2);
}

#[tokio::test]
async fn failure_messages_name_the_unconverged_device() {
    init_tracing();
    let topology = Topology::low();
    let csp = Arc::new(SimDevice::new(topology.csp_subarrays[0].clone()));
    csp.set_attribute("obsState", ObsState::Empty).await;

    let devices: Vec<DeviceHandle> = vec![csp];
    let mut waiter = Waiter::new(WaitStrategy::Polling {
        resolution: Duration::from_millis(100),
    });
    waiter
        .set_wait_for_specific_obs_state(ObsState::Idle, &devices)
        .await;

    let err = waiter.wait(Duration::from_secs(2)).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("low-csp/subarray/01"));
    assert!(msg.contains("obsState"));
    assert!(msg.contains("IDLE"));
}
