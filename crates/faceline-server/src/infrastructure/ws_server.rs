//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket, refusing unknown
//!    paths (404) and roles (400) before the upgrade completes.
//! 3. Running one writer task per connection that drains its outbound queue
//!    into the socket, and handing the read half (as a stream of
//!    [`TransportEvent`]s) to a [`MatchSession`] or the [`SignalingRelay`].
//! 4. Closing every connection with 1001 when the `running` flag is cleared.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{ConnectionHandle, MatchSession, Outbound, ServerContext, SignalingRelay};
use crate::domain::{CloseCode, Route, RouteError, TransportEvent};

/// How often the accept loop wakes up to check the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How long a finished session waits for its writer to flush.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The transport's own cap, as a multiple of `max_message_bytes`.  Messages
/// between the two limits are read in full and refused by the session;
/// only messages past this cap end the connection.
const TRANSPORT_HEADROOM: usize = 4;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the listener on `addr`.
///
/// # Errors
///
/// Returns an error if the port is in use or the process lacks permission.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Binds `ctx.config.bind_addr` and serves until `running` is cleared.
pub async fn run_server(ctx: Arc<ServerContext>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = bind(ctx.config.bind_addr).await?;
    serve(listener, ctx, running).await
}

/// Accepts connections on an already bound listener until `running` is set
/// to `false`, then closes every registered connection with 1001.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    info!("faceline server listening on {local}");

    // The flag is only checked between accepts, so shutdown latency is at
    // most one ACCEPT_POLL.
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the shutdown flag even when
        // nobody is connecting.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("TCP connection from {peer_addr}");
                // Each connection gets its own task; the accept loop never
                // waits on a handshake.
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. too many open files); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {} // Poll timeout; re-check the flag.
        }
    }

    // Connection tasks notice the close through their handles and release
    // themselves; nothing waits for them here.

    let closed = ctx
        .registry
        .close_all(CloseCode::GoingAway, "server shutting down")
        .await;
    info!("closed {closed} connection(s) on shutdown");
    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Entry point of each connection task: runs [`run_connection`] and logs
/// how it ended.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<ServerContext>) {
    match run_connection(stream, peer_addr, ctx).await {
        Ok(()) => debug!("connection {peer_addr} finished"),
        Err(e) => warn!("connection {peer_addr} ended with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<ServerContext>,
) -> anyhow::Result<()> {
    // ── Step 1: upgrade, capturing the route from the request path ────────────
    // The callback runs inside the handshake and can only hand the parsed
    // route out through this captured slot.
    let mut route: Option<Route> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match Route::parse(request.uri().path()) {
            Ok(parsed) => {
                route = Some(parsed);
                Ok(response)
            }
            Err(e) => {
                info!("refusing {peer_addr}: {e}");
                Err(reject(&e))
            }
        }
    };

    let ws_stream =
        accept_hdr_async_with_config(stream, callback, Some(ws_config(ctx.config.max_message_bytes)))
            .await
            .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let route = route.context("handshake completed without a route")?;

    // ── Step 2: outbound queue + writer task ──────────────────────────────────
    let id = match &route {
        Route::Match { .. } => format!("match-{}", Uuid::new_v4()),
        Route::Signaling { client_id, .. } => client_id.clone(),
    };
    let (handle, outbound_rx) = ConnectionHandle::new(id, ctx.config.outbound_queue);
    let (sink, source) = ws_stream.split();
    let writer = tokio::spawn(write_outbound(sink, outbound_rx, handle.id().to_string()));

    // ── Step 3: run the session on the inbound half ───────────────────────────
    let limit = ctx.config.max_message_bytes;
    let inbound = source.map(move |item| transport_event(item, limit));
    match route {
        Route::Match { subject_id } => {
            info!("match session {} from {peer_addr} for {subject_id}", handle.id());
            match MatchSession::open(&ctx, &subject_id, handle).await {
                Ok(session) => {
                    session.run(inbound).await;
                }
                Err(e) => debug!("match session for {subject_id} refused: {e}"),
            }
        }
        Route::Signaling { client_id, role } => {
            debug!("{role} {client_id} upgraded from {peer_addr}");
            SignalingRelay::new(Arc::clone(&ctx.registry))
                .run(role, handle, inbound)
                .await;
        }
    }

    // ── Step 4: let the writer flush ──────────────────────────────────────────
    //
    // The session has dropped its handle and released its registration, so
    // the writer sees the queue close once pending messages are written.
    if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("writer for {peer_addr} did not finish in time");
    }
    Ok(())
}

/// Drains `rx` into the WebSocket until the queue closes, a close is
/// requested, or the socket fails.
async fn write_outbound(mut sink: WsSink, mut rx: mpsc::Receiver<Outbound>, id: String) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    debug!("{id}: write failed: {e}");
                    return;
                }
            }
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code: WsCloseCode::from(code.as_u16()),
                    reason: reason.into(),
                };
                if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                    debug!("{id}: close frame not sent: {e}");
                }
                return;
            }
        }
    }
    // Every handle is gone: the session ended on its own.
    let _ = sink.close().await;
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ws_config(max_message_bytes: usize) -> WebSocketConfig {
    let cap = max_message_bytes.saturating_mul(TRANSPORT_HEADROOM);
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(cap);
    config.max_frame_size = Some(cap);
    config
}

/// Builds the HTTP response that refuses an upgrade.
fn reject(err: &RouteError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    response
}

fn too_long(len: usize, max: usize) -> String {
    format!("message of {len} bytes exceeds the {max} byte limit")
}

/// Maps one item of the WebSocket read half onto a [`TransportEvent`],
/// refusing complete messages longer than `max_message_bytes`.
fn transport_event(item: Result<WsMessage, WsError>, max_message_bytes: usize) -> TransportEvent {
    match item {
        Ok(WsMessage::Text(text)) if text.len() > max_message_bytes => {
            TransportEvent::ReceiveFailed(too_long(text.len(), max_message_bytes))
        }
        Ok(WsMessage::Binary(bytes)) if bytes.len() > max_message_bytes => {
            TransportEvent::ReceiveFailed(too_long(bytes.len(), max_message_bytes))
        }
        Ok(WsMessage::Text(text)) => TransportEvent::Text(text),
        Ok(WsMessage::Binary(bytes)) => TransportEvent::Binary(bytes),
        Ok(WsMessage::Close(_)) => TransportEvent::Disconnected,
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {
            TransportEvent::Ignored
        }
        // tokio-tungstenite ends the stream after any read error, so these
        // cannot be reported and skipped like an oversize message.
        Err(e @ WsError::Utf8) => TransportEvent::Violation {
            code: CloseCode::InvalidData,
            reason: e.to_string(),
        },
        Err(e @ WsError::Capacity(_)) => TransportEvent::Violation {
            code: CloseCode::MessageTooBig,
            reason: e.to_string(),
        },
        Err(e) => {
            debug!("read side ended: {e}");
            TransportEvent::Disconnected
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
