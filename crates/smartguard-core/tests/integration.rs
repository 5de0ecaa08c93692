//! Integration tests for smartguard-core
//!
//! Everything here runs against the mock telemetry source and mock mesh
//! transport on a paused clock, so the tests are fast and deterministic.
//! The single hardware test needs a powered gateway in range:
//! `cargo test --package smartguard-core -- --ignored --nocapture`

use std::sync::Arc;
use std::time::Duration;

use smartguard_core::demo::DEMO_DEVICE_ID;
use smartguard_core::{
    BleMeshTransport, ConnectionStatus, ConnectionType, CoreOptions, DataSource, Error,
    EventReceiver, MeshTransport, MockMeshTransport, MockTelemetrySource, NewNode, NoticeLevel,
    ReconnectOptions, RecordingNotifier, SafetyCore, SafetyEvent, SafetySnapshot, Status,
    TelemetrySample, TransportFailure, UserSettings,
};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(120);

fn sample(ppm: f64) -> TelemetrySample {
    TelemetrySample {
        ppm,
        temperature: 21.5,
        humidity: 44.0,
        timestamp: OffsetDateTime::now_utc(),
    }
}

fn cloud_settings(channel: &str) -> UserSettings {
    UserSettings {
        channel_id: channel.to_string(),
        ..Default::default()
    }
}

fn quiet_demo() -> CoreOptions {
    CoreOptions {
        alert_probability: 0.0,
        demo_seed: Some(5),
        ..Default::default()
    }
}

async fn wait_for(core: &SafetyCore, check: impl Fn(&SafetySnapshot) -> bool) -> SafetySnapshot {
    let mut rx = core.watch();
    timeout(WAIT, async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if check(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("core stopped");
        }
    })
    .await
    .expect("snapshot condition not reached")
}

async fn next_event(
    events: &mut EventReceiver,
    check: impl Fn(&SafetyEvent) -> bool,
) -> SafetyEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if check(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event not received")
}

fn is_notice(event: &SafetyEvent, wanted: NoticeLevel, text: &str) -> bool {
    matches!(
        event,
        SafetyEvent::Notice { level, message } if *level == wanted && message.contains(text)
    )
}

#[tokio::test(start_paused = true)]
async fn test_cloud_reading_above_danger() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(2600.0)));
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source.clone())
        .spawn()
        .unwrap();

    let snapshot = wait_for(&core, |s| s.telemetry.has_data()).await;
    assert_eq!(snapshot.status, Status::Danger);
    assert_eq!(snapshot.data_source, DataSource::Cloud);
    assert_eq!(snapshot.connection.kind(), ConnectionType::Network);
    assert_eq!(snapshot.connection.status(), ConnectionStatus::Connected);
    assert_eq!(snapshot.display.ppm, 2600.0);
    assert!(snapshot.alert.is_none());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cloud_polls_on_interval() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(400.0)));
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source.clone())
        .spawn()
        .unwrap();

    // immediate poll, then one every 15 s
    sleep(Duration::from_secs(31)).await;
    assert_eq!(source.latest_calls(), 3);

    source.set_latest(Some(sample(1200.0))).await;
    let snapshot = wait_for(&core, |s| s.telemetry.ppm == 1200.0).await;
    assert_eq!(snapshot.status, Status::Warning);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unset_channel_never_polls() {
    for channel in ["0", ""] {
        let source = Arc::new(MockTelemetrySource::with_latest(sample(3000.0)));
        let core = SafetyCore::builder()
            .settings(cloud_settings(channel))
            .telemetry_source(source.clone())
            .spawn()
            .unwrap();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(source.latest_calls(), 0, "channel {channel:?} was polled");

        let snapshot = core.snapshot();
        assert_eq!(snapshot.connection.kind(), ConnectionType::Offline);
        assert_eq!(snapshot.status, Status::Safe);
        assert!(!snapshot.has_data());

        core.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_cloud_error_reported_once() {
    let source = Arc::new(MockTelemetrySource::new());
    source.set_failure(Some("rate limited")).await;
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source.clone())
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    next_event(&mut events, |e| is_notice(e, NoticeLevel::Error, "Cloud sync failed")).await;
    sleep(Duration::from_secs(45)).await;
    assert!(source.latest_calls() >= 3);

    let mut repeats = 0;
    while let Ok(event) = events.try_recv() {
        if is_notice(&event, NoticeLevel::Error, "Cloud sync failed") {
            repeats += 1;
        }
    }
    assert_eq!(repeats, 0);
    assert_eq!(core.snapshot().connection.status(), ConnectionStatus::Error);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_mesh_alert_overrides_cloud_until_cleared() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(450.0)));
    let transport = Arc::new(MockMeshTransport::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source)
        .transport(transport.clone())
        .notifier(notifier.clone())
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    wait_for(&core, |s| s.telemetry.has_data()).await;
    let device = core.link_mesh().await.unwrap();
    assert_eq!(device.label(), "SmartGuard-Gateway");
    assert_eq!(
        core.snapshot().connection.kind(),
        ConnectionType::BluetoothProximity
    );

    assert!(transport.send_frame("ALERT:X1:3150:Boiler Room").await);
    let snapshot = wait_for(&core, |s| s.alert.is_some()).await;
    assert_eq!(snapshot.status, Status::Danger);
    assert_eq!(snapshot.data_source, DataSource::LocalMesh);
    assert_eq!(snapshot.display.ppm, 3150.0);
    assert!(snapshot.display.temperature.is_none());
    assert!(snapshot.any_node_in_danger);

    let node = snapshot.nodes.iter().find(|n| n.device_id.as_deref() == Some("X1")).unwrap();
    assert_eq!(node.location, "Boiler Room");
    assert_eq!(node.status, Status::Danger);
    assert_eq!(notifier.count(), 1);

    next_event(&mut events, |e| matches!(e, SafetyEvent::AlertRaised { .. })).await;

    // cloud keeps polling underneath without displacing the alert
    sleep(Duration::from_secs(20)).await;
    assert_eq!(core.snapshot().data_source, DataSource::LocalMesh);

    let cleared = core.clear_alert().await.unwrap().unwrap();
    assert_eq!(cleared.source_device_id, "X1");
    let snapshot = wait_for(&core, |s| s.alert.is_none()).await;
    assert_eq!(snapshot.data_source, DataSource::Cloud);
    assert_eq!(snapshot.status, Status::Safe);
    assert_eq!(snapshot.display.ppm, 450.0);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_packet_is_ignored() {
    let transport = Arc::new(MockMeshTransport::default());
    let core = SafetyCore::builder()
        .transport(transport.clone())
        .spawn()
        .unwrap();

    core.link_mesh().await.unwrap();
    assert!(transport.send_frame("ALERT:X1").await);
    assert!(transport.send_bytes(vec![0xff, 0x00, 0xfe]).await);
    assert!(transport.send_frame("DATA:N1:420:21.0:40").await);

    let snapshot = wait_for(&core, |s| !s.nodes.is_empty()).await;
    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(snapshot.nodes[0].device_id.as_deref(), Some("N1"));
    assert_eq!(snapshot.nodes[0].status, Status::Safe);
    assert!(snapshot.alert.is_none());
    assert_eq!(snapshot.status, Status::Safe);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_demo_alert_persists_until_cleared() {
    let options = CoreOptions {
        alert_probability: 1.0,
        demo_seed: Some(9),
        ..Default::default()
    };
    let core = SafetyCore::builder()
        .settings(UserSettings {
            demo_mode: true,
            ..Default::default()
        })
        .options(options)
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    let snapshot = wait_for(&core, |s| s.alert.is_some()).await;
    let alert = snapshot.alert.clone().unwrap();
    assert_eq!(alert.source_device_id, DEMO_DEVICE_ID);
    assert_eq!(snapshot.status, Status::Danger);
    assert_eq!(snapshot.connection.kind(), ConnectionType::Demo);

    // further ticks neither clear nor replace it
    sleep(Duration::from_secs(30)).await;
    assert_eq!(core.snapshot().alert, Some(alert.clone()));

    assert_eq!(core.clear_alert().await.unwrap(), Some(alert));
    next_event(&mut events, |e| matches!(e, SafetyEvent::AlertCleared { .. })).await;

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_demo_toggle_purges_cloud_reading() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(3000.0)));
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source.clone())
        .options(quiet_demo())
        .spawn()
        .unwrap();

    wait_for(&core, |s| s.status == Status::Danger).await;

    let mut settings = core.snapshot().settings;
    settings.demo_mode = true;
    core.update_settings(settings.clone()).await.unwrap();

    let snapshot = core.snapshot();
    assert_eq!(snapshot.data_source, DataSource::Demo);
    assert_eq!(snapshot.status, Status::Safe);

    sleep(Duration::from_secs(40)).await;
    let calls = source.latest_calls();
    let snapshot = core.snapshot();
    assert!(snapshot.telemetry.ppm < 600.0);
    assert_eq!(snapshot.connection.kind(), ConnectionType::Demo);

    // cloud polling is stopped while demo mode is on
    sleep(Duration::from_secs(40)).await;
    assert_eq!(source.latest_calls(), calls);

    settings.demo_mode = false;
    core.update_settings(settings).await.unwrap();
    let snapshot = wait_for(&core, |s| s.telemetry.ppm == 3000.0).await;
    assert_eq!(snapshot.data_source, DataSource::Cloud);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_channel_change_discards_in_flight_poll() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(3000.0)));
    source.set_latency(Duration::from_secs(5)).await;
    let core = SafetyCore::builder()
        .settings(cloud_settings("1"))
        .telemetry_source(source.clone())
        .spawn()
        .unwrap();

    while source.latest_calls() == 0 {
        tokio::task::yield_now().await;
    }
    source.set_latest(Some(sample(400.0))).await;
    core.update_settings(cloud_settings("2")).await.unwrap();

    sleep(Duration::from_secs(8)).await;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.telemetry.ppm, 400.0);
    assert_eq!(snapshot.status, Status::Safe);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_settings_rejected() {
    let core = SafetyCore::builder().spawn().unwrap();
    let settings = UserSettings {
        warning_threshold: 3000.0,
        danger_threshold: 2000.0,
        ..Default::default()
    };
    let err = core.update_settings(settings).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(core.snapshot().settings.warning_threshold, 1000.0);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_threshold_change_reclassifies() {
    let source = Arc::new(MockTelemetrySource::with_latest(sample(900.0)));
    let core = SafetyCore::builder()
        .settings(cloud_settings("2512345"))
        .telemetry_source(source)
        .spawn()
        .unwrap();

    wait_for(&core, |s| s.telemetry.has_data()).await;
    assert_eq!(core.snapshot().status, Status::Safe);

    let mut settings = core.snapshot().settings;
    settings.warning_threshold = 800.0;
    core.update_settings(settings).await.unwrap();
    let snapshot = core.snapshot();
    assert_eq!(snapshot.status, Status::Warning);
    assert_eq!(snapshot.telemetry.ppm, 900.0);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pairing_failure_reported() {
    let transport = Arc::new(MockMeshTransport::default());
    transport.set_pair_failure(Some(TransportFailure::NoDeviceSelected));
    let core = SafetyCore::builder()
        .transport(transport.clone())
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    let err = core.link_mesh().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportFailure::NoDeviceSelected)
    ));
    next_event(&mut events, |e| {
        is_notice(e, NoticeLevel::Error, "Selection cancelled. No device linked.")
    })
    .await;

    let snapshot = core.snapshot();
    assert_eq!(snapshot.mesh_status, ConnectionStatus::Disconnected);
    assert_eq!(snapshot.connection.kind(), ConnectionType::Offline);
    assert!(snapshot.paired_device.is_none());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pairing_without_transport() {
    let core = SafetyCore::builder().spawn().unwrap();
    let err = core.link_mesh().await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportFailure::Unsupported)));
    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pairing_times_out() {
    let transport = Arc::new(MockMeshTransport::default());
    transport.set_latency(Duration::from_secs(600));
    let options = CoreOptions {
        pair_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let core = SafetyCore::builder()
        .transport(transport)
        .options(options)
        .spawn()
        .unwrap();

    let err = core.link_mesh().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(core.snapshot().mesh_status, ConnectionStatus::Disconnected);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unlink_closes_session() {
    let transport = Arc::new(MockMeshTransport::default());
    let core = SafetyCore::builder()
        .transport(transport.clone())
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    core.link_mesh().await.unwrap();
    assert!(transport.is_linked());
    // linking again while linked is a no-op
    core.link_mesh().await.unwrap();
    assert_eq!(transport.pair_calls(), 1);

    assert!(core.unlink_mesh().await.unwrap());
    next_event(&mut events, |e| {
        matches!(e, SafetyEvent::Unlinked { user_initiated: true, .. })
    })
    .await;
    assert!(!transport.is_linked());
    assert!(!transport.send_frame("ALERT:X1:3000:Hall").await);

    let snapshot = core.snapshot();
    assert!(snapshot.paired_device.is_none());
    assert_eq!(snapshot.mesh_status, ConnectionStatus::Disconnected);
    assert!(!core.unlink_mesh().await.unwrap());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_link_reconnects_with_backoff() {
    let transport = Arc::new(MockMeshTransport::default());
    let options = CoreOptions {
        reconnect: ReconnectOptions::new()
            .initial_delay(Duration::from_secs(1))
            .max_attempts(4),
        ..Default::default()
    };
    let core = SafetyCore::builder()
        .settings(UserSettings {
            auto_connect: true,
            ..Default::default()
        })
        .transport(transport.clone())
        .options(options)
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    core.link_mesh().await.unwrap();
    transport.fail_reconnects(2);
    assert!(transport.drop_link("out of range").await);

    next_event(&mut events, |e| {
        matches!(e, SafetyEvent::Unlinked { user_initiated: false, .. })
    })
    .await;
    next_event(&mut events, |e| is_notice(e, NoticeLevel::Error, "Link to gateway lost.")).await;

    let started = tokio::time::Instant::now();
    for attempt in 1..=3 {
        let event = next_event(&mut events, |e| {
            matches!(e, SafetyEvent::ReconnectStarted { .. })
        })
        .await;
        assert!(matches!(event, SafetyEvent::ReconnectStarted { attempt: a, .. } if a == attempt));
    }
    next_event(&mut events, |e| matches!(e, SafetyEvent::Linked { .. })).await;

    // 1 s + 2 s + 4 s of backoff
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert_eq!(transport.reconnect_calls(), 3);
    assert_eq!(transport.pair_calls(), 1);
    assert!(transport.is_linked());
    wait_for(&core, |s| s.mesh_status == ConnectionStatus::Connected).await;

    assert!(transport.send_frame("ALERT:X7:2900:Garage").await);
    wait_for(&core, |s| s.alert.is_some()).await;

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up() {
    let transport = Arc::new(MockMeshTransport::default());
    let options = CoreOptions {
        reconnect: ReconnectOptions::fixed_delay(Duration::from_secs(2)).max_attempts(2),
        ..Default::default()
    };
    let core = SafetyCore::builder()
        .settings(UserSettings {
            auto_connect: true,
            ..Default::default()
        })
        .transport(transport.clone())
        .options(options)
        .spawn()
        .unwrap();
    let mut events = core.subscribe();

    core.link_mesh().await.unwrap();
    transport.fail_reconnects(10);
    transport.drop_link("out of range").await;

    next_event(&mut events, |e| is_notice(e, NoticeLevel::Error, "Could not re-link")).await;
    assert_eq!(transport.reconnect_calls(), 2);

    let snapshot = core.snapshot();
    assert_eq!(snapshot.mesh_status, ConnectionStatus::Disconnected);
    // the paired device is remembered for a manual re-link
    assert!(snapshot.paired_device.is_some());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_link_without_auto_connect() {
    let transport = Arc::new(MockMeshTransport::default());
    let core = SafetyCore::builder()
        .transport(transport.clone())
        .spawn()
        .unwrap();

    core.link_mesh().await.unwrap();
    transport.drop_link("out of range").await;
    wait_for(&core, |s| s.mesh_status == ConnectionStatus::Disconnected).await;

    sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.reconnect_calls(), 0);

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_node_management() {
    let core = SafetyCore::builder().spawn().unwrap();
    let mut events = core.subscribe();

    let node = core
        .add_node(NewNode {
            name: Some("Kitchen".to_string()),
            location: Some("Ground floor".to_string()),
            device_id: Some("K-1".to_string()),
        })
        .await
        .unwrap()
        .unwrap();
    next_event(&mut events, |e| {
        is_notice(e, NoticeLevel::Success, "Device \"Kitchen\" added.")
    })
    .await;

    let duplicate = core
        .add_node(NewNode {
            device_id: Some("K-1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(duplicate.is_none());

    let removed = core.remove_node(node.id.clone()).await.unwrap().unwrap();
    assert_eq!(removed.name, "Kitchen");
    next_event(&mut events, |e| {
        is_notice(e, NoticeLevel::Info, "Device removed from network.")
    })
    .await;
    assert!(core.snapshot().nodes.is_empty());
    assert!(core.remove_node(node.id).await.unwrap().is_none());

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_handle_after_shutdown() {
    let core = SafetyCore::builder().spawn().unwrap();
    let handle = core.handle();
    core.shutdown().await;

    assert!(!handle.is_running());
    assert!(matches!(handle.clear_alert().await, Err(Error::Closed)));
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_pair_with_gateway() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();

    let transport = BleMeshTransport::new();
    let mut session = timeout(Duration::from_secs(60), transport.pair())
        .await
        .expect("pairing timed out")
        .expect("pairing failed");
    println!("Linked to {}", session.device.label());

    match timeout(Duration::from_secs(30), session.events.recv()).await {
        Ok(Some(event)) => println!("First event: {event:?}"),
        Ok(None) => println!("Link closed"),
        Err(_) => println!("No packet within 30 s"),
    }
    session.close();
}
