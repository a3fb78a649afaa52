//! Sync channel tests over real sockets
//!
//! Each test runs the driver side in the test body and the debuggee side
//! in a spawned task, the way the two processes would run in practice.

use std::time::Duration;

use jdwp_harness::common::config::SyncConfig;
use jdwp_harness::debuggee::{run_sync_debuggee, DebuggeeSettings};
use jdwp_harness::sync::{ChannelState, SyncOptions, Synchronizer};
use jdwp_harness::Error;

fn options(role: &str) -> SyncOptions {
    let config = SyncConfig {
        connect_timeout_secs: 5,
        receive_timeout_secs: 5,
        ..SyncConfig::default()
    };
    SyncOptions::from_config(&config, role)
}

#[tokio::test]
async fn test_ready_continue_end_exchange() {
    let mut driver = Synchronizer::new(options("driver"));
    let port = driver.bind_server().await.unwrap();
    assert_eq!(driver.state(), ChannelState::Bound);

    let debuggee = tokio::spawn(async move {
        let mut sync = Synchronizer::new(options("debuggee"));
        sync.connect_client(port).await.unwrap();
        sync.send_message("ready").await.unwrap();
        sync.receive_expected("continue").await.unwrap();
        sync.send_message("end").await.unwrap();
        sync.stop().await;
    });

    driver.start_server().await.unwrap();
    assert_eq!(driver.state(), ChannelState::Connected);

    assert_eq!(driver.receive_message().await.unwrap(), "ready");
    driver.send_message("continue").await.unwrap();
    assert_eq!(driver.receive_message().await.unwrap(), "end");

    debuggee.await.unwrap();
    driver.stop().await;
    assert_eq!(driver.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_peer_disconnect_is_channel_closed() {
    let mut driver = Synchronizer::new(options("driver"));
    let port = driver.bind_server().await.unwrap();

    let debuggee = tokio::spawn(async move {
        let mut sync = Synchronizer::new(options("debuggee"));
        sync.connect_client(port).await.unwrap();
        sync.send_message("ready").await.unwrap();
        sync.stop().await;
    });

    driver.start_server().await.unwrap();
    debuggee.await.unwrap();

    assert_eq!(driver.receive_message().await.unwrap(), "ready");
    assert!(matches!(
        driver.receive_message().await,
        Err(Error::ChannelClosed)
    ));
}

#[tokio::test]
async fn test_unexpected_signal_reports_both_sides() {
    let mut driver = Synchronizer::new(options("driver"));
    let port = driver.bind_server().await.unwrap();

    let debuggee = tokio::spawn(async move {
        let mut sync = Synchronizer::new(options("debuggee"));
        sync.connect_client(port).await.unwrap();
        sync.send_message("not-ready").await.unwrap();
        sync
    });

    driver.start_server().await.unwrap();
    match driver.receive_expected("ready").await {
        Err(Error::UnexpectedSignal { expected, received }) => {
            assert_eq!(expected, "ready");
            assert_eq!(received, "not-ready");
        }
        other => panic!("expected UnexpectedSignal, got {:?}", other),
    }

    let mut sync = debuggee.await.unwrap();
    sync.stop().await;
}

#[tokio::test]
async fn test_debuggee_loop_against_driver() {
    let mut driver = Synchronizer::new(options("driver"));
    let port = driver.bind_server().await.unwrap();

    let debuggee = tokio::spawn(async move {
        let mut seen = Vec::new();
        let outcome = run_sync_debuggee(options("debuggee"), port, |i| seen.push(i)).await;
        (outcome, seen)
    });

    driver.start_server().await.unwrap();
    for _ in 0..2 {
        driver.receive_expected("ready").await.unwrap();
        driver.send_message("continue").await.unwrap();
    }
    driver.receive_expected("ready").await.unwrap();
    driver.send_message("stop").await.unwrap();
    driver.receive_expected("end").await.unwrap();

    let (outcome, seen) = debuggee.await.unwrap();
    let outcome = outcome.unwrap();
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.stop_signal.as_deref(), Some("stop"));
    assert_eq!(seen, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_debuggee_port_from_startup_option() {
    let mut driver = Synchronizer::new(options("driver"));
    let port = driver.bind_server().await.unwrap();

    let option = format!("-Djpda.settings.syncPort={}", port);
    let settings = DebuggeeSettings::from_args([option.as_str()]);
    let parsed = settings.sync_port("jpda.settings.syncPort").unwrap();
    assert_eq!(parsed, port);

    let debuggee = tokio::spawn(async move {
        let mut sync = Synchronizer::new(options("debuggee"));
        sync.connect_client(parsed).await.unwrap();
        sync.send_message("ready").await.unwrap();
        sync
    });

    tokio::time::timeout(Duration::from_secs(5), driver.start_server())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver.receive_message().await.unwrap(), "ready");
    drop(debuggee.await.unwrap());
}
