//! The sending side of one client connection.
//!
//! A [`ConnectionHandle`] is what the registry stores and what other
//! sessions use to reach a client.  Sends never wait: each message goes into
//! a bounded queue that the connection's writer task drains into the socket,
//! so one slow client cannot stall the sender.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::domain::CloseCode;

/// An instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame and stop writing.
    Close { code: CloseCode, reason: String },
}

/// Why a message could not be queued for a client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The client is not reading fast enough; the message was dropped.
    #[error("outbound queue full")]
    Full,

    /// The connection is closing or gone.
    #[error("connection closed")]
    Closed,

    #[error("message could not be encoded: {0}")]
    Encode(String),
}

struct Inner {
    id: String,
    serial: Uuid,
    tx: mpsc::Sender<Outbound>,
    closed: watch::Sender<bool>,
}

/// A cloneable handle to one live connection.
///
/// Two handles refer to the same connection exactly when their serials are
/// equal; the id alone is not enough because a reconnecting client reuses it.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver its writer task drains.
    pub fn new(id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Self {
            inner: Arc::new(Inner {
                id: id.into(),
                serial: Uuid::new_v4(),
                tx,
                closed,
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn serial(&self) -> Uuid {
        self.inner.serial
    }

    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.inner.serial == other.inner.serial
    }

    /// Queues a text message without waiting.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.inner.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Serializes `message` to JSON and queues it.
    pub fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), SendError> {
        let text = serde_json::to_string(message).map_err(|e| SendError::Encode(e.to_string()))?;
        self.send_text(text)
    }

    /// Asks the writer to send a close frame, and wakes the connection's
    /// read loop.  Only the first call has an effect; returns whether this
    /// call was it.
    pub fn close(&self, code: CloseCode, reason: impl Into<String>) -> bool {
        let first = self.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            // A full queue only loses the close frame; the read loop still
            // wakes and the socket is dropped.
            let _ = self.inner.tx.try_send(Outbound::Close {
                code,
                reason: reason.into(),
            });
        }
        first
    }

    /// True once the writer task has stopped draining the queue.
    pub fn writer_gone(&self) -> bool {
        self.inner.tx.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        // The sender lives in `inner`, so this cannot observe a dropped channel.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("serial", &self.inner.serial)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
