//! Scene directory behavior against the mock control server.

mod support;

use obsdeck::obs::protocol::Request;
use obsdeck::obs::{ConnectionParams, ConnectionStatus, ObsManager};
use obsdeck::scenes::SceneDirectory;
use std::time::Duration;
use support::{wait_for, MockServer};
use tokio_util::sync::CancellationToken;

const FAST_RETRY: Duration = Duration::from_millis(20);
const FAST_SETTLE: Duration = Duration::from_millis(50);

fn params(addr: &str) -> ConnectionParams {
    ConnectionParams {
        address: addr.to_string(),
        credential: "x".to_string(),
    }
}

#[tokio::test]
async fn populates_after_settle_delay() {
    let mut server = MockServer::start(&["Scene A", "Scene B"], "x").await;
    let cancel = CancellationToken::new();
    let obs = ObsManager::spawn(FAST_RETRY, cancel.clone());
    let scenes = SceneDirectory::spawn(obs.clone(), FAST_SETTLE, cancel.clone());

    let mut status_rx = obs.subscribe();
    obs.configure(params(&server.addr));
    wait_for(&mut status_rx, ConnectionStatus::Connected).await;

    // Exactly one ListScenes after the settle delay.
    let request = tokio::time::timeout(Duration::from_secs(5), server.requests.recv())
        .await
        .expect("expected a ListScenes query")
        .unwrap();
    assert_eq!(request, Request::ListScenes);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), server.requests.recv())
            .await
            .is_err(),
        "only one query per connect"
    );

    // Give the reply a moment to land in the cache.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*scenes.current(), vec!["Scene A", "Scene B"]);

    cancel.cancel();
}

#[tokio::test]
async fn clears_on_disconnect() {
    let server = MockServer::start(&["Scene A"], "x").await;
    let cancel = CancellationToken::new();
    let obs = ObsManager::spawn(FAST_RETRY, cancel.clone());
    let scenes = SceneDirectory::spawn(obs.clone(), FAST_SETTLE, cancel.clone());

    let mut status_rx = obs.subscribe();
    obs.configure(params(&server.addr));
    wait_for(&mut status_rx, ConnectionStatus::Connected).await;

    tokio::time::sleep(FAST_SETTLE + Duration::from_millis(150)).await;
    assert_eq!(*scenes.current(), vec!["Scene A"]);

    // Kill the server entirely: the close is followed by failing
    // reconnect attempts, never a healthy session.
    server.shutdown();
    wait_for(&mut status_rx, ConnectionStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(scenes.current().is_empty());

    cancel.cancel();
}

#[tokio::test]
async fn refreshes_again_after_reconnect() {
    let mut server = MockServer::start(&["Scene A"], "x").await;
    let cancel = CancellationToken::new();
    let obs = ObsManager::spawn(FAST_RETRY, cancel.clone());
    let scenes = SceneDirectory::spawn(obs.clone(), FAST_SETTLE, cancel.clone());

    let mut status_rx = obs.subscribe();
    obs.configure(params(&server.addr));
    wait_for(&mut status_rx, ConnectionStatus::Connected).await;

    let first = tokio::time::timeout(Duration::from_secs(5), server.requests.recv())
        .await
        .expect("first query")
        .unwrap();
    assert_eq!(first, Request::ListScenes);

    // Drop the session; the manager reconnects on its own and the
    // directory queries once more.
    server.kill_connections();
    wait_for(&mut status_rx, ConnectionStatus::Connected).await;

    let second = tokio::time::timeout(Duration::from_secs(5), server.requests.recv())
        .await
        .expect("second query after reconnect")
        .unwrap();
    assert_eq!(second, Request::ListScenes);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*scenes.current(), vec!["Scene A"]);

    cancel.cancel();
}
