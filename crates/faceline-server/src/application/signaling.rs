//! WebRTC signaling relay between streamers and viewers.
//!
//! The relay never looks inside SDP or ICE payloads.  It only reads the
//! `type` and the addressing fields, stamps the sender's id into `from`, and
//! hands the message to the target's queue.  Registry bookkeeping
//! (`new_streamer`, `active_streamers`, `streamer_left`) happens in
//! [`SessionRegistry`].

use std::sync::Arc;

use faceline_core::{ServerEvent, SignalingMessage};
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use super::registry::{Delivery, SessionRegistry};
use crate::domain::{ClientRole, TransportEvent};

/// What happened to one inbound signaling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Forwarded { to: String },
    /// The target is not connected (or is not a streamer, for
    /// `request_stream`).  Nothing is sent anywhere.
    TargetAbsent { target: String },
    /// The target exists but its queue refused the message.
    DeliveryFailed { target: String },
    /// No target was given.  Nothing is sent anywhere.
    Dropped,
    /// The message could not be parsed; an error event went back to the sender.
    Rejected(String),
}

/// Routes signaling messages between registered connections.
#[derive(Debug, Clone)]
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Registers `handle` under its id with the given role.
    pub async fn connect(&self, role: ClientRole, handle: &ConnectionHandle) {
        info!("{role} {} connected", handle.id());
        self.registry
            .add(handle.id(), role.into(), handle.clone())
            .await;
    }

    /// Removes `handle`'s registration if it still owns its id.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        let removed = self.registry.release(handle).await;
        info!("{} disconnected", handle.id());
        removed
    }

    /// Parses and routes one text message from `from`.
    pub async fn handle_text(&self, from: &ConnectionHandle, text: &str) -> RelayOutcome {
        match serde_json::from_str::<SignalingMessage>(text) {
            Ok(message) => self.route(from.id(), message).await,
            Err(e) => self.reject(from, format!("invalid signaling message: {e}")),
        }
    }

    /// Routes an already parsed message.
    pub async fn route(&self, from: &str, message: SignalingMessage) -> RelayOutcome {
        let kind = message.type_name();
        let sender = from.to_string();

        let (target, event) = match message {
            SignalingMessage::Offer { target, offer } => {
                (target, ServerEvent::Offer { offer, from: sender })
            }
            SignalingMessage::Answer { target, answer } => {
                (target, ServerEvent::Answer { answer, from: sender })
            }
            SignalingMessage::IceCandidate { target, candidate } => (
                target,
                ServerEvent::IceCandidate {
                    candidate,
                    from: sender,
                },
            ),
            SignalingMessage::RequestStream { streamer_id } => {
                let Some(streamer_id) = streamer_id else {
                    debug!("{from}: request_stream without streamerId dropped");
                    return RelayOutcome::Dropped;
                };
                let event = ServerEvent::StreamRequest { from: sender };
                let delivery = self.registry.send_to_streamer(&streamer_id, &event).await;
                return outcome(from, kind, streamer_id, delivery);
            }
        };

        let Some(target) = target else {
            debug!("{from}: {kind} without target dropped");
            return RelayOutcome::Dropped;
        };

        let delivery = self.registry.send_to(&target, &event).await;
        outcome(from, kind, target, delivery)
    }

    fn reject(&self, from: &ConnectionHandle, error: String) -> RelayOutcome {
        warn!("{}: {error}", from.id());
        if let Err(e) = from.send_json(&ServerEvent::Error {
            error: error.clone(),
        }) {
            debug!("{}: error reply not sent: {e}", from.id());
        }
        RelayOutcome::Rejected(error)
    }

    /// Drives one signaling connection: registers it, relays every inbound
    /// message until the client leaves or the handle is closed, then
    /// releases the registration.
    pub async fn run<S>(&self, role: ClientRole, handle: ConnectionHandle, mut inbound: S)
    where
        S: Stream<Item = TransportEvent> + Unpin,
    {
        self.connect(role, &handle).await;

        loop {
            let event = tokio::select! {
                biased;
                _ = handle.closed() => break,
                event = inbound.next() => event.unwrap_or(TransportEvent::Disconnected),
            };

            match event {
                TransportEvent::Text(text) => {
                    self.handle_text(&handle, &text).await;
                }
                TransportEvent::Binary(bytes) => {
                    self.reject(
                        &handle,
                        format!("binary messages are not supported ({} bytes)", bytes.len()),
                    );
                }
                TransportEvent::ReceiveFailed(reason) => {
                    self.reject(&handle, format!("could not read message: {reason}"));
                }
                TransportEvent::Violation { code, reason } => {
                    self.reject(&handle, format!("could not read message: {reason}"));
                    handle.close(code, reason);
                    break;
                }
                TransportEvent::Ignored => {}
                TransportEvent::Disconnected => break,
            }

            if handle.writer_gone() {
                debug!("{}: writer gone", handle.id());
                break;
            }
        }

        self.disconnect(&handle).await;
    }
}

fn outcome(from: &str, kind: &str, target: String, delivery: Delivery) -> RelayOutcome {
    match delivery {
        Delivery::Delivered => {
            debug!("{kind} {from} -> {target}");
            RelayOutcome::Forwarded { to: target }
        }
        Delivery::Absent => {
            debug!("{from}: {kind} for unknown target {target}");
            RelayOutcome::TargetAbsent { target }
        }
        Delivery::Failed => {
            warn!("{from}: {kind} could not be queued for {target}");
            RelayOutcome::DeliveryFailed { target }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
