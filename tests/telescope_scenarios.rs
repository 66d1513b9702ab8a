//! End-to-end scenarios: command a simulated telescope, then synchronize on
//! the resulting attribute transitions with the waiter and event recorder.

use std::sync::Arc;
use std::time::Duration;
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

async fn sim_master(name: &str) -> Arc<SimDevice> {
    let dev = Arc::new(SimDevice::new(name));
    dev.set_attribute("State", DeviceState::Standby).await;
    dev.on_command(
        "On",
        vec![("State".to_string(), AttrValue::State(DeviceState::On))],
    )
    .await;
    dev.on_command(
        "Off",
        vec![("State".to_string(), AttrValue::State(DeviceState::Off))],
    )
    .await;
    dev
}

#[tokio::test]
async fn telescope_on_command_then_wait() {
    init_tracing();
    let csp = sim_master("mid-csp/elt/master").await;
    let sdp = sim_master("mid-sdp/elt/master").await;

    let central = Arc::new(SimDevice::new("ska_mid/tm_central/central_node"));
    central
        .set_attribute("telescopeState", DeviceState::Standby)
        .await;
    central
        .on_command(
            "TelescopeOn",
            vec![(
                "telescopeState".to_string(),
                AttrValue::State(DeviceState::On),
            )],
        )
        .await;

    // Fan the command out the way the central node does.
    central.command_inout("TelescopeOn", None).await.unwrap();
    csp.command_inout("On", None).await.unwrap();
    sdp.command_inout("On", None).await.unwrap();

    let mut waiter = Waiter::new(fast_polling())
        .with_central_node(central.clone())
        .with_csp_master(csp.clone())
        .with_sdp_master(sdp.clone());
    waiter.set_wait_for_telescope_on().await;
    waiter.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(waiter.success_log.len(), 3);
}

#[tokio::test]
async fn assign_resources_with_recorder_observing_the_transition() {
    init_tracing();
    let subarray = Arc::new(SimDevice::new("ska_mid/tm_subarray_node/1"));
    subarray.set_attribute("obsState", ObsState::Empty).await;
    subarray
        .on_command(
            "AssignResources",
            vec![
                ("obsState".to_string(), AttrValue::Obs(ObsState::Resourcing)),
                ("obsState".to_string(), AttrValue::Obs(ObsState::Idle)),
                (
                    "longRunningCommandResult".to_string(),
                    AttrValue::StrArray(vec!["1001_AssignResources".into(), "0".into()]),
                ),
            ],
        )
        .await;

    let mut recorder = EventRecorder::new();
    recorder
        .subscribe_event(subarray.clone(), "obsState", Duration::from_secs(5))
        .await
        .unwrap();
    recorder
        .subscribe_event(
            subarray.clone(),
            "longRunningCommandResult",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    subarray
        .command_inout("AssignResources", None)
        .await
        .unwrap();

    assert!(recorder
        .wait_until_change_event(
            "ska_mid/tm_subarray_node/1",
            "obsState",
            &AttrValue::Obs(ObsState::Idle),
        )
        .await
        .unwrap());
    // The intermediate RESOURCING event was recorded too.
    assert!(recorder
        .has_change_event_occurred(
            "ska_mid/tm_subarray_node/1",
            "obsState",
            &AttrValue::Obs(ObsState::Resourcing),
            7,
        )
        .await
        .unwrap());
    assert!(recorder
        .wait_until_change_event(
            "ska_mid/tm_subarray_node/1",
            "longRunningCommandResult",
            &AttrValue::StrArray(vec!["1001_AssignResources".into(), "0".into()]),
        )
        .await
        .unwrap());

    recorder.clear_events().await;
    assert_eq!(recorder.subscription_count(), 0);
}

#[tokio::test]
async fn abort_path_with_direct_obs_state() {
    init_tracing();
    let subarray = Arc::new(SimDevice::new("low-csp/subarray/01"));
    subarray.set_attribute("obsState", ObsState::Scanning).await;

    let mut waiter = Waiter::new(WaitStrategy::Events).with_csp_subarray(subarray.clone());
    waiter.set_wait_for_abort().await;

    let driver = subarray.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        driver
            .command_inout("SetDirectObsState", Some(AttrValue::from("ABORTED")))
            .await
            .unwrap();
    });

    waiter.wait(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn defective_device_recovers_within_the_wait_budget() {
    init_tracing();
    let csp = sim_master("mid-csp/elt/master").await;
    csp.command_inout("SetDefective", Some(AttrValue::Bool(true)))
        .await
        .unwrap();

    let mut waiter = Waiter::new(fast_polling()).with_csp_master(csp.clone());
    waiter.set_wait_for_telescope_on().await;

    let driver = csp.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver
            .command_inout("SetDefective", Some(AttrValue::Bool(false)))
            .await
            .unwrap();
        driver.command_inout("On", None).await.unwrap();
    });

    waiter.wait(Duration::from_secs(5)).await.unwrap();
}
