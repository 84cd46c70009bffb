//! Integration tests for presence notifications and signaling routing.
//!
//! These drive [`SessionRegistry`] and [`SignalingRelay`] through their public
//! API with in-memory connection handles, the same way the WebSocket server
//! does, and check what every connected client would have received.
//!
//! ```text
//! streamer ──offer──► relay ──offer{from}──► viewer
//!          ◄─answer{from}──  ◄──answer─────
//! registry ──new_streamer / streamer_left──► every viewer
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use faceline_server::application::{
    ConnectionHandle, Outbound, RelayOutcome, SessionRegistry, SignalingRelay,
};
use faceline_server::domain::{ClientRole, ConnectionKind, TransportEvent};
use futures_util::stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

struct Client {
    handle: ConnectionHandle,
    rx: mpsc::Receiver<Outbound>,
}

impl Client {
    fn new(id: &str) -> Self {
        let (handle, rx) = ConnectionHandle::new(id, 32);
        Self { handle, rx }
    }

    /// Every JSON message queued so far.
    fn received(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Outbound::Text(text) = msg {
                out.push(serde_json::from_str(&text).expect("valid JSON"));
            }
        }
        out
    }
}

fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
    messages.iter().filter(|m| m["type"] == kind).collect()
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remove_of_absent_id_returns_false_and_broadcasts_nothing() {
    // Arrange
    let registry = SessionRegistry::new();
    let mut viewer = Client::new("viewer");
    registry
        .add("viewer", ConnectionKind::Viewer, viewer.handle.clone())
        .await;
    viewer.received();

    // Act
    let removed = registry.remove("nobody").await;

    // Assert
    assert!(!removed);
    assert!(viewer.received().is_empty());
}

#[tokio::test]
async fn test_viewer_snapshot_lists_both_streamers() {
    // Arrange
    let registry = SessionRegistry::new();
    let s1 = Client::new("phone-a");
    let s2 = Client::new("phone-b");
    registry
        .add("phone-a", ConnectionKind::Streamer, s1.handle.clone())
        .await;
    registry
        .add("phone-b", ConnectionKind::Streamer, s2.handle.clone())
        .await;

    // Act
    let mut viewer = Client::new("desk");
    registry
        .add("desk", ConnectionKind::Viewer, viewer.handle.clone())
        .await;

    // Assert
    let messages = viewer.received();
    let snapshot = of_type(&messages, "active_streamers");
    assert_eq!(snapshot.len(), 1);
    let ids: HashSet<String> = snapshot[0]["streamers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let expected: HashSet<String> = ["phone-a", "phone-b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(registry.list_streamer_ids().await, expected);
}

#[tokio::test]
async fn test_streamer_disconnect_notifies_each_viewer_once_and_no_match_session() {
    // Arrange
    let registry = Arc::new(SessionRegistry::new());
    let relay = SignalingRelay::new(Arc::clone(&registry));
    let mut viewers: Vec<Client> = (0..3).map(|i| Client::new(&format!("v{i}"))).collect();
    for v in &viewers {
        relay.connect(ClientRole::Viewer, &v.handle).await;
    }
    let mut matcher_client = Client::new("match-x");
    registry
        .add("match-x", ConnectionKind::Match, matcher_client.handle.clone())
        .await;
    let streamer = Client::new("phone");

    // Act: the streamer connects, then disconnects
    relay
        .run(
            ClientRole::Streamer,
            streamer.handle.clone(),
            stream::iter(vec![TransportEvent::Disconnected]),
        )
        .await;

    // Assert
    for v in viewers.iter_mut() {
        let messages = v.received();
        let left = of_type(&messages, "streamer_left");
        assert_eq!(left.len(), 1, "viewer {}", v.handle.id());
        assert_eq!(left[0]["streamerId"], "phone");
    }
    assert!(matcher_client.received().is_empty());

    // A second removal of the same id announces nothing.
    assert!(!registry.remove("phone").await);
    for v in viewers.iter_mut() {
        assert!(v.received().is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_adds_and_removes_keep_maps_consistent() {
    // Arrange
    let registry = Arc::new(SessionRegistry::new());

    // Act: 50 streamers and 50 viewers join concurrently, half of each leave
    let mut tasks = Vec::new();
    for i in 0..100 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let id = format!("c{i}");
            let (handle, rx) = ConnectionHandle::new(id.clone(), 256);
            let kind = if i % 2 == 0 {
                ConnectionKind::Streamer
            } else {
                ConnectionKind::Viewer
            };
            registry.add(&id, kind, handle.clone()).await;
            if i % 4 < 2 {
                registry.release(&handle).await;
            }
            rx
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Assert
    assert_eq!(registry.connection_count().await, 50);
    let streamers = registry.list_streamer_ids().await;
    assert_eq!(streamers.len(), 25);
    for id in &streamers {
        assert_eq!(registry.kind_of(id).await, Some(ConnectionKind::Streamer));
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_offer_to_unregistered_target_delivers_nothing_anywhere() {
    // Arrange
    let registry = Arc::new(SessionRegistry::new());
    let relay = SignalingRelay::new(Arc::clone(&registry));
    let mut streamer = Client::new("phone");
    let mut viewer = Client::new("desk");
    relay.connect(ClientRole::Streamer, &streamer.handle).await;
    relay.connect(ClientRole::Viewer, &viewer.handle).await;
    streamer.received();
    viewer.received();

    // Act
    let outcome = relay
        .handle_text(
            &streamer.handle,
            &json!({"type": "offer", "target": "ghost", "offer": {"sdp": "v=0"}}).to_string(),
        )
        .await;

    // Assert
    assert!(matches!(outcome, RelayOutcome::TargetAbsent { .. }));
    assert!(streamer.received().is_empty(), "no error back to the sender");
    assert!(viewer.received().is_empty());
}

#[tokio::test]
async fn test_full_negotiation_between_streamer_and_viewer() {
    // Arrange
    let registry = Arc::new(SessionRegistry::new());
    let relay = SignalingRelay::new(Arc::clone(&registry));
    let mut streamer = Client::new("phone");
    let mut viewer = Client::new("desk");
    relay.connect(ClientRole::Streamer, &streamer.handle).await;
    relay.connect(ClientRole::Viewer, &viewer.handle).await;
    assert_eq!(
        of_type(&viewer.received(), "active_streamers")[0]["streamers"],
        json!(["phone"])
    );

    // Act
    relay
        .handle_text(
            &viewer.handle,
            r#"{"type":"request_stream","streamerId":"phone"}"#,
        )
        .await;
    relay
        .handle_text(
            &streamer.handle,
            r#"{"type":"offer","target":"desk","offer":{"type":"offer","sdp":"o"}}"#,
        )
        .await;
    relay
        .handle_text(
            &viewer.handle,
            r#"{"type":"answer","target":"phone","answer":{"type":"answer","sdp":"a"}}"#,
        )
        .await;
    relay
        .handle_text(
            &viewer.handle,
            r#"{"type":"ice-candidate","target":"phone","candidate":{"candidate":"c1"}}"#,
        )
        .await;

    // Assert
    assert_eq!(
        streamer.received(),
        vec![
            json!({"type": "stream_request", "from": "desk"}),
            json!({"type": "answer", "answer": {"type": "answer", "sdp": "a"}, "from": "desk"}),
            json!({"type": "ice-candidate", "candidate": {"candidate": "c1"}, "from": "desk"}),
        ]
    );
    assert_eq!(
        viewer.received(),
        vec![json!({"type": "offer", "offer": {"type": "offer", "sdp": "o"}, "from": "phone"})]
    );
}

#[tokio::test]
async fn test_reconnecting_streamer_does_not_announce_departure() {
    // Arrange
    let registry = Arc::new(SessionRegistry::new());
    let relay = SignalingRelay::new(Arc::clone(&registry));
    let mut viewer = Client::new("desk");
    relay.connect(ClientRole::Viewer, &viewer.handle).await;
    let first = Client::new("phone");
    relay.connect(ClientRole::Streamer, &first.handle).await;

    // Act: same id reconnects, then the old connection's teardown runs
    let second = Client::new("phone");
    relay.connect(ClientRole::Streamer, &second.handle).await;
    let removed = relay.disconnect(&first.handle).await;

    // Assert
    assert!(!removed);
    assert!(first.handle.is_closed());
    assert!(registry.is_streamer("phone").await);
    let messages = viewer.received();
    assert!(of_type(&messages, "streamer_left").is_empty());
    assert_eq!(of_type(&messages, "new_streamer").len(), 2);
}
