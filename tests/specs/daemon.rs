//! Daemon specs
//!
//! A real daemon on a loopback port: agents connect over WebSocket and
//! state survives a restart.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use keel_daemon::{startup_with, Config, DaemonState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::prelude::*;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn config(dir: &Path) -> Config {
    Config {
        listen_addr: "127.0.0.1:0".to_string(),
        app_namespace: "apps".to_string(),
        reconcile_tick: Duration::from_millis(20),
        checkpoint_interval: Duration::from_millis(50),
        ..Config::for_state_dir(dir.to_path_buf())
    }
}

async fn start(config: &Config) -> DaemonState {
    startup_with(config, FakeRenderer::new(), FakeBackupSystem::new(), FakeClock::new())
        .await
        .unwrap()
}

async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let (ws, _) = connect_async(format!("ws://{addr}/agent?token={token}")).await.unwrap();
    ws
}

/// Next event the daemon sends, skipping control frames.
async fn next_event(ws: &mut Socket) -> AgentEvent {
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return keel_wire::decode(text.as_str()).unwrap(),
                Some(Ok(Message::Close(frame))) => panic!("closed by daemon: {frame:?}"),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read).await.unwrap()
}

#[tokio::test]
async fn connected_agent_is_sent_its_deploy() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let daemon = start(&config).await;
    seed(&daemon.store);
    release_into(&daemon.store, 1);

    let mut ws = connect(daemon.listen_addr, TOKEN).await;

    match next_event(&mut ws).await {
        AgentEvent::Deploy(args) => {
            assert_eq!(applied(&args), manifest(1));
            assert_eq!(args.namespace, "apps");
        }
        other => panic!("expected deploy, got {}", other.name()),
    }
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let daemon = start(&config).await;
    seed(&daemon.store);
    release_into(&daemon.store, 7);
    daemon.shutdown().await.unwrap();

    let daemon = start(&config).await;
    assert!(daemon.store.app(&app_id()).is_some());
    assert_eq!(
        daemon.store.downstream(&app_id(), &cluster_id()).and_then(|d| d.current_sequence),
        Some(7)
    );

    // Deploy caches are per connection and start cold after a restart.
    let mut ws = connect(daemon.listen_addr, TOKEN).await;
    match next_event(&mut ws).await {
        AgentEvent::Deploy(args) => assert_eq!(applied(&args), manifest(7)),
        other => panic!("expected deploy, got {}", other.name()),
    }
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn agent_with_a_bad_token_is_turned_away() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = start(&config(dir.path())).await;
    seed(&daemon.store);

    let mut ws = connect(daemon.listen_addr, "wrong").await;

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
    assert!(daemon.registry.is_empty());
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_daemon_on_the_same_state_dir_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let daemon = start(&config).await;

    let second =
        startup_with(&config, FakeRenderer::new(), FakeBackupSystem::new(), FakeClock::new())
            .await;

    assert!(matches!(second, Err(keel_daemon::LifecycleError::LockFailed(_))));
    assert!(config.lock_path.exists());
    daemon.shutdown().await.unwrap();
}
