//! Live face-matching session: one browser, one subject.
//!
//! ```text
//!  open() ──(subject has a reference)──► Armed ──(registered)──► Active
//!    │                                                             │
//!    └──(not found / store failure)──► Err        Closed ◄─(disconnect, close)
//! ```
//!
//! [`MatchSession::open`] is the handshake; a session value only exists once
//! its reference is loaded.
//!
//! The browser sends `{"frame": "<data URI>"}` roughly twice a second; every
//! decodable frame gets exactly one [`MatchResult`] back, in receipt order.
//! Frames that do not decode are skipped without a reply so a flaky camera
//! does not flood the client with errors.

use std::sync::Arc;

use faceline_core::protocol::messages::SUBJECT_NOT_FOUND;
use faceline_core::{
    decode_frame, FrameDecodeError, FrameMessage, MatchError, MatchOutcome, MatchResult, Matcher,
    ReferenceVector,
};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionHandle, SendError};
use super::context::ServerContext;
use super::registry::SessionRegistry;
use super::subject_store::StoreError;
use crate::domain::{CloseCode, ConnectionKind, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Armed,
    Active,
    Closed,
}

/// Why a session never reached `Armed`.  The client has already been told
/// and the close frame is queued.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("subject not found or has no reference embedding")]
    SubjectNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do with a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop it silently and keep going.
    Skip,
    /// Send an error result and keep going.
    Report,
    /// End the session.
    Close,
}

/// Everything that can go wrong while handling one inbound message.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid message: {0}")]
    Envelope(String),

    #[error("binary messages are not supported ({0} bytes); send JSON text")]
    Binary(usize),

    #[error("could not read message: {0}")]
    Receive(String),

    #[error("frame could not be decoded: {0}")]
    Decode(#[from] FrameDecodeError),

    #[error("matching failed: {0}")]
    Match(#[from] MatchError),

    #[error("could not send result: {0}")]
    Outbound(#[from] SendError),
}

impl FrameError {
    pub fn disposition(&self) -> Disposition {
        match self {
            FrameError::Envelope(_) | FrameError::Binary(_) | FrameError::Receive(_) => {
                Disposition::Report
            }
            FrameError::Decode(_) => Disposition::Skip,
            FrameError::Match(_) => Disposition::Report,
            // A slow reader loses this result but keeps the session.
            FrameError::Outbound(SendError::Full) => Disposition::Skip,
            FrameError::Outbound(_) => Disposition::Close,
        }
    }
}

/// Per-session counters, logged on close and returned from [`MatchSession::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Text messages received.
    pub messages: u64,
    /// Match results (including `{"matched": false}`) sent.
    pub results: u64,
    /// Messages dropped without a reply.
    pub skipped: u64,
    /// Error results sent.
    pub errors: u64,
}

pub struct MatchSession {
    subject_id: String,
    reference: ReferenceVector,
    matcher: Matcher,
    registry: Arc<SessionRegistry>,
    handle: ConnectionHandle,
    state: SessionState,
    stats: SessionStats,
}

impl MatchSession {
    /// Runs the handshake: looks the subject up and loads its reference.
    ///
    /// On failure the client is sent an error result and the connection is
    /// closed (1000 for an unknown subject, 1011 for a store failure).
    pub async fn open(
        ctx: &ServerContext,
        subject_id: &str,
        handle: ConnectionHandle,
    ) -> Result<MatchSession, HandshakeError> {
        let reference = match ctx.store.subject(subject_id).await {
            Ok(subject) => subject.and_then(|s| s.reference()),
            Err(e) => {
                error!("match {}: subject lookup for {subject_id} failed: {e}", handle.id());
                let _ = handle.send_json(&MatchResult::error(e.to_string()));
                handle.close(CloseCode::ServerError, "subject store unavailable");
                return Err(e.into());
            }
        };

        let Some(reference) = reference else {
            info!("match {}: subject {subject_id} not found", handle.id());
            let _ = handle.send_json(&MatchResult::error(SUBJECT_NOT_FOUND));
            handle.close(CloseCode::Normal, SUBJECT_NOT_FOUND);
            return Err(HandshakeError::SubjectNotFound);
        };

        info!(
            "match {}: armed for {subject_id} ({}, {} dims)",
            handle.id(),
            reference.name(),
            reference.dimensions()
        );

        Ok(MatchSession {
            subject_id: subject_id.to_string(),
            reference,
            matcher: ctx.matcher.clone(),
            registry: Arc::clone(&ctx.registry),
            handle,
            state: SessionState::Armed,
            stats: SessionStats::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reference(&self) -> &ReferenceVector {
        &self.reference
    }

    /// Registers the session and processes `inbound` until the client leaves
    /// or the handle is closed, then releases the registration.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionStats
    where
        S: Stream<Item = TransportEvent> + Unpin,
    {
        self.registry
            .add(self.handle.id(), ConnectionKind::Match, self.handle.clone())
            .await;
        self.state = SessionState::Active;

        while self.state == SessionState::Active {
            let event = tokio::select! {
                biased;
                _ = self.handle.closed() => None,
                event = inbound.next() => Some(event.unwrap_or(TransportEvent::Disconnected)),
            };
            match event {
                Some(event) => self.handle_event(event),
                None => {
                    debug!("match {}: handle closed", self.handle.id());
                    self.state = SessionState::Closed;
                }
            }
        }

        self.registry.release(&self.handle).await;
        info!(
            "match {} for {} closed: {} messages, {} results, {} skipped, {} errors",
            self.handle.id(),
            self.subject_id,
            self.stats.messages,
            self.stats.results,
            self.stats.skipped,
            self.stats.errors
        );
        self.stats
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let outcome = match event {
            TransportEvent::Disconnected => {
                self.state = SessionState::Closed;
                return;
            }
            TransportEvent::Ignored => return,
            TransportEvent::Text(text) => {
                self.stats.messages += 1;
                self.process_text(&text)
            }
            TransportEvent::Binary(bytes) => Err(FrameError::Binary(bytes.len())),
            TransportEvent::ReceiveFailed(reason) => Err(FrameError::Receive(reason)),
            TransportEvent::Violation { code, reason } => {
                self.abort(code, &reason);
                return;
            }
        };

        match outcome {
            Ok(Some(result)) => self.emit(&result),
            // No `frame` field.
            Ok(None) => self.stats.skipped += 1,
            Err(err) => self.fail(err),
        }
    }

    /// Turns one text message into at most one result.
    fn process_text(&self, text: &str) -> Result<Option<MatchResult>, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::Envelope(e.to_string()))?;
        if !value.is_object() {
            return Err(FrameError::Envelope("expected a JSON object".to_string()));
        }
        let message: FrameMessage =
            serde_json::from_value(value).map_err(|e| FrameError::Envelope(e.to_string()))?;

        let Some(payload) = message.frame else {
            return Ok(None);
        };

        let frame = decode_frame(&payload)?;
        let outcome = self.matcher.evaluate(&frame, &self.reference)?;
        if let MatchOutcome::Scored { similarity } = outcome {
            debug!(
                "match {}: {}x{} frame scored {similarity:.4}",
                self.handle.id(),
                frame.width(),
                frame.height()
            );
        }
        Ok(Some(outcome.into_result(&self.reference)))
    }

    fn emit(&mut self, result: &MatchResult) {
        match self.handle.send_json(result) {
            Ok(()) if result.is_error() => self.stats.errors += 1,
            Ok(()) => self.stats.results += 1,
            Err(e) => self.fail(FrameError::Outbound(e)),
        }
    }

    /// The transport cannot deliver further messages: report, then close
    /// with the protocol code the transport chose.
    fn abort(&mut self, code: CloseCode, reason: &str) {
        warn!("match {}: closing with {}: {reason}", self.handle.id(), code.as_u16());
        let error = FrameError::Receive(reason.to_string());
        if self.handle.send_json(&MatchResult::error(error.to_string())).is_ok() {
            self.stats.errors += 1;
        }
        self.handle.close(code, reason);
        self.state = SessionState::Closed;
    }

    fn fail(&mut self, err: FrameError) {
        match err.disposition() {
            Disposition::Skip => {
                debug!("match {}: skipped: {err}", self.handle.id());
                self.stats.skipped += 1;
            }
            Disposition::Report => {
                warn!("match {}: {err}", self.handle.id());
                self.emit(&MatchResult::error(err.to_string()));
            }
            Disposition::Close => {
                warn!("match {}: closing: {err}", self.handle.id());
                self.handle.close(CloseCode::ServerError, "internal error");
                self.state = SessionState::Closed;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection::Outbound;
    use crate::application::subject_store::SubjectStore;
    use crate::domain::ServerConfig;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use faceline_core::{Embedding, EmbeddingExtractor, ExtractError, RasterFrame, Subject};
    use futures_util::stream;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use mockall::mock;
    use serde_json::json;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::sync::mpsc;

    mock! {
        Store {}

        #[async_trait]
        impl SubjectStore for Store {
            async fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError>;
        }
    }

    /// Uses the first pixel's red and green values as the embedding; a black
    /// pixel means no face.
    struct PixelExtractor;

    impl EmbeddingExtractor for PixelExtractor {
        fn extract(&self, frame: &RasterFrame) -> Result<Option<Embedding>, ExtractError> {
            let px = frame.pixels();
            if px[0] == 0 && px[1] == 0 {
                return Ok(None);
            }
            Ok(Some(Embedding::new(vec![px[0] as f32, px[1] as f32])))
        }
    }

    fn subject(id: &str, embedding: Option<Vec<f32>>) -> Subject {
        Subject {
            id: id.to_string(),
            name: "Bataa".to_string(),
            embedding: embedding.map(Embedding::new),
        }
    }

    fn context_with(store: MockStore) -> ServerContext {
        ServerContext::new(
            ServerConfig::default(),
            Arc::new(store),
            Matcher::new(PixelExtractor),
        )
    }

    fn store_with(subject: Subject) -> MockStore {
        let mut store = MockStore::new();
        store.expect_subject().returning(move |id| {
            Ok((id == subject.id).then(|| subject.clone()))
        });
        store
    }

    fn frame_message(red: u8, green: u8) -> TransportEvent {
        let img = RgbImage::from_pixel(2, 2, Rgb([red, green, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&buf));
        TransportEvent::Text(json!({ "frame": uri }).to_string())
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn texts(out: &[Outbound]) -> Vec<serde_json::Value> {
        out.iter()
            .filter_map(|m| match m {
                Outbound::Text(t) => Some(serde_json::from_str(t).unwrap()),
                Outbound::Close { .. } => None,
            })
            .collect()
    }

    async fn run_events(
        ctx: &ServerContext,
        events: Vec<TransportEvent>,
    ) -> (SessionStats, Vec<Outbound>) {
        let (handle, mut rx) = ConnectionHandle::new("match-test", 64);
        let session = MatchSession::open(ctx, "p1", handle).await.unwrap();
        let stats = session.run(stream::iter(events)).await;
        (stats, drain(&mut rx))
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unknown_subject_sends_error_and_closes_normally() {
        // Arrange
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let (handle, mut rx) = ConnectionHandle::new("m", 8);

        // Act
        let result = MatchSession::open(&ctx, "nobody", handle.clone()).await;

        // Assert
        assert!(matches!(result, Err(HandshakeError::SubjectNotFound)));
        let out = drain(&mut rx);
        assert_eq!(
            texts(&out),
            vec![json!({"error": "Person not found or no embedding"})]
        );
        assert!(out.contains(&Outbound::Close {
            code: CloseCode::Normal,
            reason: "Person not found or no embedding".to_string()
        }));
        assert!(handle.is_closed());
        assert_eq!(ctx.registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_subject_without_embedding_is_not_found() {
        let ctx = context_with(store_with(subject("p1", None)));
        let (handle, _rx) = ConnectionHandle::new("m", 8);

        let result = MatchSession::open(&ctx, "p1", handle).await;

        assert!(matches!(result, Err(HandshakeError::SubjectNotFound)));
    }

    #[tokio::test]
    async fn test_store_failure_closes_with_server_error() {
        // Arrange
        let mut store = MockStore::new();
        store
            .expect_subject()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("disk gone".to_string())));
        let ctx = context_with(store);
        let (handle, mut rx) = ConnectionHandle::new("m", 8);

        // Act
        let result = MatchSession::open(&ctx, "p1", handle).await;

        // Assert
        assert!(matches!(result, Err(HandshakeError::Store(_))));
        let out = drain(&mut rx);
        assert!(texts(&out)[0]["error"].as_str().unwrap().contains("disk gone"));
        assert!(out
            .iter()
            .any(|m| matches!(m, Outbound::Close { code: CloseCode::ServerError, .. })));
    }

    #[tokio::test]
    async fn test_open_loads_reference_and_arms() {
        let ctx = context_with(store_with(subject("p1", Some(vec![3.0, 4.0]))));
        let (handle, _rx) = ConnectionHandle::new("m", 8);

        let session = MatchSession::open(&ctx, "p1", handle).await.unwrap();

        assert_eq!(session.state(), SessionState::Armed);
        assert_eq!(session.reference().name(), "Bataa");
        assert_eq!(session.reference().dimensions(), 2);
    }

    // ── Active loop ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_matching_frame_reports_name() {
        // Arrange: reference points along the red axis
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));

        // Act
        let (stats, out) = run_events(&ctx, vec![frame_message(200, 0)]).await;

        // Assert
        let results = texts(&out);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["matched"], json!(true));
        assert_eq!(results[0]["name"], json!("Bataa"));
        assert_eq!(results[0]["similarity"], json!(1.0));
        assert_eq!(stats.results, 1);
    }

    #[tokio::test]
    async fn test_orthogonal_frame_does_not_match() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));

        let (_, out) = run_events(&ctx, vec![frame_message(0, 200)]).await;

        let results = texts(&out);
        assert_eq!(results[0]["matched"], json!(false));
        assert_eq!(results[0]["similarity"], json!(0.0));
        assert!(results[0]["name"].is_null());
    }

    #[tokio::test]
    async fn test_faceless_frame_reports_bare_no_match() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));

        let (_, out) = run_events(&ctx, vec![frame_message(0, 0)]).await;

        assert_eq!(texts(&out), vec![json!({"matched": false})]);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_skipped_silently() {
        // Arrange
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![
            TransportEvent::Text(json!({"frame": "data:image/jpeg;base64,!!!"}).to_string()),
            TransportEvent::Text(json!({"frame": STANDARD.encode(b"not an image")}).to_string()),
            frame_message(10, 0),
        ];

        // Act
        let (stats, out) = run_events(&ctx, events).await;

        // Assert: only the good frame produced a result
        let results = texts(&out);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["matched"], json!(true));
        assert_eq!(stats.skipped, 2);
    }

    #[tokio::test]
    async fn test_message_without_frame_is_skipped() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![
            TransportEvent::Text("{}".to_string()),
            TransportEvent::Text(r#"{"frame":null}"#.to_string()),
        ];

        let (stats, out) = run_events(&ctx, events).await;

        assert!(texts(&out).is_empty());
        assert_eq!(stats.skipped, 2);
    }

    #[tokio::test]
    async fn test_non_object_json_reports_error_and_continues() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![
            TransportEvent::Text("not json".to_string()),
            TransportEvent::Text(r#"["frame"]"#.to_string()),
            frame_message(10, 0),
        ];

        let (stats, out) = run_events(&ctx, events).await;

        let results = texts(&out);
        assert_eq!(results.len(), 3);
        assert!(results[0]["error"].is_string());
        assert!(results[1]["error"].is_string());
        assert_eq!(results[2]["matched"], json!(true));
        assert_eq!(stats.errors, 2);
    }

    #[tokio::test]
    async fn test_binary_and_receive_failures_report_errors() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![
            TransportEvent::Binary(vec![1, 2, 3]),
            TransportEvent::ReceiveFailed("message too long".to_string()),
            TransportEvent::Ignored,
        ];

        let (stats, out) = run_events(&ctx, events).await;

        let results = texts(&out);
        assert_eq!(results.len(), 2);
        assert!(results[0]["error"].as_str().unwrap().contains("binary"));
        assert!(results[1]["error"]
            .as_str()
            .unwrap()
            .contains("message too long"));
        assert_eq!(stats.errors, 2);
    }

    #[tokio::test]
    async fn test_transport_violation_reports_then_closes_with_its_code() {
        // Arrange: the frame after the violation must never be processed
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![
            TransportEvent::Violation {
                code: CloseCode::InvalidData,
                reason: "UTF-8 encoding error".to_string(),
            },
            frame_message(10, 0),
        ];

        // Act
        let (stats, out) = run_events(&ctx, events).await;

        // Assert
        let results = texts(&out);
        assert_eq!(results.len(), 1);
        assert!(results[0]["error"].as_str().unwrap().contains("UTF-8"));
        assert!(out.contains(&Outbound::Close {
            code: CloseCode::InvalidData,
            reason: "UTF-8 encoding error".to_string(),
        }));
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.messages, 0);
        assert_eq!(ctx.registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_reports_error() {
        // Arrange: three-dimensional reference, two-dimensional embeddings
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0, 0.0]))));

        // Act
        let (_, out) = run_events(&ctx, vec![frame_message(5, 5)]).await;

        // Assert
        let results = texts(&out);
        assert_eq!(results.len(), 1);
        assert!(results[0]["error"].is_string());
    }

    #[tokio::test]
    async fn test_results_follow_receipt_order() {
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let events = vec![frame_message(9, 0), frame_message(0, 9), frame_message(0, 0)];

        let (_, out) = run_events(&ctx, events).await;

        let results = texts(&out);
        assert_eq!(results[0]["matched"], json!(true));
        assert_eq!(results[1]["similarity"], json!(0.0));
        assert_eq!(results[2], json!({"matched": false}));
    }

    #[tokio::test]
    async fn test_session_is_released_after_disconnect() {
        // Arrange
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let (handle, _rx) = ConnectionHandle::new("m-released", 8);
        let session = MatchSession::open(&ctx, "p1", handle).await.unwrap();

        // Act
        session
            .run(stream::iter(vec![TransportEvent::Disconnected, frame_message(1, 0)]))
            .await;

        // Assert
        assert_eq!(ctx.registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_wakes_idle_session() {
        // Arrange: an inbound side that never yields anything
        let ctx = Arc::new(context_with(store_with(subject("p1", Some(vec![1.0, 0.0])))));
        let (handle, _rx) = ConnectionHandle::new("m-idle", 8);
        let session = MatchSession::open(&ctx, "p1", handle.clone())
            .await
            .unwrap();
        let task = tokio::spawn(session.run(stream::pending::<TransportEvent>()));

        // Wait until the session has registered itself.
        for _ in 0..100 {
            if ctx.registry.connection_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Act
        handle.close(CloseCode::GoingAway, "server shutting down");

        // Assert
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session should end")
            .unwrap();
        assert_eq!(ctx.registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_writer_ends_session() {
        // Arrange: the writer side is gone before any frame arrives
        let ctx = context_with(store_with(subject("p1", Some(vec![1.0, 0.0]))));
        let (handle, rx) = ConnectionHandle::new("m-gone", 8);
        let session = MatchSession::open(&ctx, "p1", handle).await.unwrap();
        drop(rx);

        // Act: the second frame would be processed if the session kept going
        let stats = session
            .run(stream::iter(vec![frame_message(1, 0), frame_message(2, 0)]))
            .await;

        // Assert
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.results, 0);
    }

    #[test]
    fn test_dispositions() {
        assert_eq!(
            FrameError::Decode(FrameDecodeError::Empty).disposition(),
            Disposition::Skip
        );
        assert_eq!(
            FrameError::Envelope("x".into()).disposition(),
            Disposition::Report
        );
        assert_eq!(
            FrameError::Match(MatchError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
            .disposition(),
            Disposition::Report
        );
        assert_eq!(
            FrameError::Outbound(SendError::Full).disposition(),
            Disposition::Skip
        );
        assert_eq!(
            FrameError::Outbound(SendError::Closed).disposition(),
            Disposition::Close
        );
    }
}
