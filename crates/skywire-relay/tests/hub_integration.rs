#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Observer fan-out and command handling through the hub.

use std::sync::Arc;
use std::time::Duration;

use skywire_core::config::DisconnectPolicy;
use skywire_relay::hub::{BroadcastHub, ClientCommand, HubConfig, ObserverSession, ServerEvent};
use skywire_relay::supervisor::{ProducerCommand, ProducerState, SupervisorConfig};

const EMIT_LOOP: &str = concat!(
    "while true; do ",
    r#"echo "[TX] D0:10cm"; echo "[TX] G:51.5,-0.1 A12.3 S7"; "#,
    "sleep 0.05; done",
);

fn producer(script: &str) -> SupervisorConfig {
    SupervisorConfig::new(ProducerCommand::new("/bin/sh").arg("-c").arg(script))
        .with_startup_grace(Duration::from_millis(50))
        .with_terminate_timeout(Duration::from_secs(2))
}

fn launch(script: &str, policy: DisconnectPolicy) -> Arc<BroadcastHub> {
    launch_with(producer(script), policy)
}

fn launch_with(supervisor: SupervisorConfig, policy: DisconnectPolicy) -> Arc<BroadcastHub> {
    let config = HubConfig {
        disconnect_policy: policy,
        ..Default::default()
    };
    let (hub, _forwarder) = BroadcastHub::launch(supervisor, config);
    hub
}

/// Connect and consume the ack.
async fn observer(hub: &BroadcastHub) -> ObserverSession {
    let mut session = hub.connect().await;
    assert!(matches!(
        session.next_event().await,
        Some(ServerEvent::ConnectionAck { .. })
    ));
    session
}

async fn next_event(session: &mut ObserverSession) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(3), session.next_event())
        .await
        .unwrap()
        .unwrap()
}

async fn next_output(session: &mut ObserverSession) -> ServerEvent {
    loop {
        let event = next_event(session).await;
        if matches!(event, ServerEvent::OutputData { .. }) {
            return event;
        }
    }
}

fn drain(session: &mut ObserverSession) {
    while session.try_next_event().is_some() {}
}

#[tokio::test]
async fn every_observer_receives_every_record() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;
    let mut b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    assert_eq!(next_event(&mut a).await, ServerEvent::ConnectionEstablished);
    assert_eq!(next_event(&mut b).await, ServerEvent::ConnectionEstablished);

    let from_a: Vec<ServerEvent> = [next_output(&mut a).await, next_output(&mut a).await].into();
    let from_b: Vec<ServerEvent> = [next_output(&mut b).await, next_output(&mut b).await].into();
    assert_eq!(from_a, from_b);

    let json = serde_json::to_value(&from_a[0]).unwrap();
    assert_eq!(json["event"], "output_data");
    assert_eq!(json["data"]["result"]["D0"], "10cm");

    hub.supervisor().stop().await;
}

#[tokio::test]
async fn stop_from_one_observer_silences_all() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;
    let mut b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    next_output(&mut b).await;

    hub.handle_command(b.id(), ClientCommand::StopConnection).await;
    assert_eq!(hub.supervisor().state(), ProducerState::Idle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    drain(&mut a);
    drain(&mut b);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(a.try_next_event().is_none());
    assert!(b.try_next_event().is_none());
}

#[tokio::test]
async fn start_while_running_confirms_without_respawning() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    let pid = hub.supervisor().lifecycle().pid;
    hub.handle_command(a.id(), ClientCommand::StartConnection).await;

    let mut established = 0;
    while let Some(event) = a.try_next_event() {
        if event == ServerEvent::ConnectionEstablished {
            established += 1;
        }
    }
    assert_eq!(established, 2);
    assert_eq!(hub.supervisor().lifecycle().pid, pid);
    assert_eq!(hub.supervisor().lifecycle().generation, 1);

    hub.supervisor().stop().await;
}

#[tokio::test]
async fn start_failure_is_reported_once_per_observer() {
    let hub = launch_with(
        producer("echo 'no flight controller' >&2; exit 1")
            .with_startup_grace(Duration::from_millis(400)),
        DisconnectPolicy::LastObserver,
    );
    let mut a = observer(&hub).await;
    let mut b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;

    for session in [&mut a, &mut b] {
        let ServerEvent::ConnectionFailed { message } = next_event(session).await else {
            panic!("expected connection_failed");
        };
        assert!(message.starts_with("Failed to start data process"), "{message}");
        assert!(message.contains("no flight controller"), "{message}");
        assert!(session.try_next_event().is_none());
    }
    assert_eq!(hub.supervisor().state(), ProducerState::Failed);
}

#[tokio::test]
async fn reset_delivers_only_new_generation_records() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    next_output(&mut a).await;

    hub.handle_command(a.id(), ClientCommand::ResetData).await;
    assert_eq!(hub.supervisor().lifecycle().generation, 2);
    assert_eq!(hub.supervisor().state(), ProducerState::Running);

    // Skip anything delivered around the reset itself.
    loop {
        if next_event(&mut a).await == ServerEvent::ConnectionEstablished {
            break;
        }
    }
    next_output(&mut a).await;

    hub.supervisor().stop().await;
}

#[tokio::test]
async fn monitoring_pause_keeps_producer_running() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    next_output(&mut a).await;

    hub.handle_command(a.id(), ClientCommand::StopMonitoring).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drain(&mut a);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(a.try_next_event().is_none());
    assert_eq!(hub.supervisor().state(), ProducerState::Running);

    hub.handle_command(a.id(), ClientCommand::StartMonitoring).await;
    next_output(&mut a).await;

    hub.supervisor().stop().await;
}

#[tokio::test]
async fn last_observer_policy_keeps_producer_for_remaining_observers() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::LastObserver);
    let a = observer(&hub).await;
    let mut b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    hub.disconnect(a).await;
    assert_eq!(hub.observer_count().await, 1);
    assert_eq!(hub.supervisor().state(), ProducerState::Running);
    next_output(&mut b).await;

    hub.disconnect(b).await;
    assert_eq!(hub.observer_count().await, 0);
    assert_eq!(hub.supervisor().state(), ProducerState::Idle);
}

#[tokio::test]
async fn always_policy_stops_on_any_disconnect() {
    let hub = launch(EMIT_LOOP, DisconnectPolicy::Always);
    let a = observer(&hub).await;
    let _b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    hub.disconnect(a).await;
    assert_eq!(hub.supervisor().state(), ProducerState::Idle);
    assert_eq!(hub.observer_count().await, 1);
}

#[tokio::test]
async fn producer_crash_is_reported_once() {
    let hub = launch("echo D0:1cm; sleep 0.2; exit 1", DisconnectPolicy::LastObserver);
    let mut a = observer(&hub).await;
    let mut b = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;

    for session in [&mut a, &mut b] {
        assert_eq!(next_event(session).await, ServerEvent::ConnectionEstablished);
        let json = serde_json::to_value(next_event(session).await).unwrap();
        assert_eq!(json["data"]["result"]["D0"], "1cm");
        let ServerEvent::ConnectionFailed { message } = next_event(session).await else {
            panic!("expected connection_failed");
        };
        assert_eq!(message, "Data process exited unexpectedly");
    }
    assert_eq!(hub.supervisor().state(), ProducerState::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(a.try_next_event().is_none());
    assert!(b.try_next_event().is_none());

    // A fresh start recovers from the crash.
    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    assert_eq!(next_event(&mut a).await, ServerEvent::ConnectionEstablished);
    assert_eq!(hub.supervisor().lifecycle().generation, 2);
}

#[tokio::test]
async fn reset_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let script = format!(
        "if [ -e '{m}' ]; then echo 'radio lost' >&2; exit 1; fi; touch '{m}'; {EMIT_LOOP}",
        m = marker.display()
    );
    let hub = launch_with(
        producer(&script).with_startup_grace(Duration::from_millis(300)),
        DisconnectPolicy::LastObserver,
    );
    let mut a = observer(&hub).await;

    hub.handle_command(a.id(), ClientCommand::StartConnection).await;
    assert_eq!(next_event(&mut a).await, ServerEvent::ConnectionEstablished);
    next_output(&mut a).await;

    hub.handle_command(a.id(), ClientCommand::ResetData).await;
    loop {
        match next_event(&mut a).await {
            ServerEvent::OutputData { .. } => {}
            ServerEvent::ConnectionFailed { message } => {
                assert!(message.starts_with("Failed to reset data process"), "{message}");
                assert!(message.contains("radio lost"), "{message}");
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(hub.supervisor().state(), ProducerState::Failed);
    assert_eq!(hub.supervisor().lifecycle().generation, 2);
}
