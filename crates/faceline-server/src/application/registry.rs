//! Process-wide table of live connections.
//!
//! [`SessionRegistry`] is shared by every connection task.  It keeps three
//! views behind one lock: every connection, the streamers, and the viewers.
//! Streamer arrivals and departures are announced to all viewers while the
//! write lock is held, so a viewer's `active_streamers` snapshot and the
//! `new_streamer`/`streamer_left` events it receives afterwards never
//! contradict each other.
//!
//! Sends never wait (see [`ConnectionHandle`]); holding the lock across them
//! is cheap.

use std::collections::{HashMap, HashSet};

use faceline_core::ServerEvent;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use crate::domain::{CloseCode, ConnectionKind};

/// Result of a directed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No connection is registered under that id.
    Absent,
    /// The connection exists but the message could not be queued.
    Failed,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: ConnectionKind,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
struct Maps {
    all: HashMap<String, Entry>,
    streamers: HashMap<String, ConnectionHandle>,
    viewers: HashMap<String, ConnectionHandle>,
}

impl Maps {
    fn take(&mut self, id: &str) -> Option<Entry> {
        let entry = self.all.remove(id)?;
        self.streamers.remove(id);
        self.viewers.remove(id);
        Some(entry)
    }

    fn put(&mut self, id: &str, kind: ConnectionKind, handle: ConnectionHandle) {
        match kind {
            ConnectionKind::Streamer => {
                self.streamers.insert(id.to_string(), handle.clone());
            }
            ConnectionKind::Viewer => {
                self.viewers.insert(id.to_string(), handle.clone());
            }
            ConnectionKind::Match => {}
        }
        self.all.insert(id.to_string(), Entry { kind, handle });
    }

    fn streamer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streamers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Best-effort fan-out; returns how many viewers accepted the event.
    fn broadcast_to_viewers(&self, event: &ServerEvent) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode {} event: {e}", event.type_name());
                return 0;
            }
        };

        // Serialized once above; a full or closed viewer queue only costs
        // that viewer the event.
        let mut delivered = 0;
        for (viewer_id, handle) in &self.viewers {
            match handle.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(
                    "dropping {} for viewer {viewer_id}: {e}",
                    event.type_name()
                ),
            }
        }
        delivered
    }

    /// Removes `id` and announces a departed streamer.
    fn remove_and_announce(&mut self, id: &str) -> bool {
        let Some(entry) = self.take(id) else {
            return false;
        };
        if entry.kind == ConnectionKind::Streamer {
            let n = self.broadcast_to_viewers(&ServerEvent::StreamerLeft {
                streamer_id: id.to_string(),
            });
            info!("streamer {id} left; notified {n} viewer(s)");
        } else {
            debug!("{:?} connection {id} removed", entry.kind);
        }
        true
    }
}

fn deliver<T: Serialize + ?Sized>(
    id: &str,
    handle: Option<&ConnectionHandle>,
    message: &T,
) -> Delivery {
    let Some(handle) = handle else {
        return Delivery::Absent;
    };
    match handle.send_json(message) {
        Ok(()) => Delivery::Delivered,
        Err(e) => {
            debug!("send to {id} failed: {e}");
            Delivery::Failed
        }
    }
}

/// The shared connection table.  Wrap in an `Arc` and hand a clone to every
/// connection task.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    maps: RwLock<Maps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `id`, replacing and closing any previous
    /// connection with that id.
    ///
    /// - A new streamer is announced to every viewer as `new_streamer`.
    /// - A new viewer is sent `active_streamers` listing every streamer.
    /// - Replacing a streamer with a non-streamer announces `streamer_left`.
    ///
    /// Returns the superseded handle, if any.
    pub async fn add(
        &self,
        id: &str,
        kind: ConnectionKind,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        // One write guard for the whole call: the snapshot or announcement
        // below must be queued before any other mutation can broadcast.
        let mut maps = self.maps.write().await;

        let previous = maps.take(id);
        if let Some(prev) = &previous {
            // Re-adding the same connection (same serial) must not close it.
            if !prev.handle.same_connection(&handle) {
                info!("{id} reconnected; closing the previous connection");
                prev.handle
                    .close(CloseCode::Normal, "superseded by a newer connection");
            }
            if prev.kind == ConnectionKind::Streamer && kind != ConnectionKind::Streamer {
                maps.broadcast_to_viewers(&ServerEvent::StreamerLeft {
                    streamer_id: id.to_string(),
                });
            }
        }

        maps.put(id, kind, handle.clone());

        match kind {
            ConnectionKind::Streamer => {
                let n = maps.broadcast_to_viewers(&ServerEvent::new_streamer(id));
                info!("streamer {id} connected; notified {n} viewer(s)");
            }
            ConnectionKind::Viewer => {
                let streamers = maps.streamer_ids();
                info!(
                    "viewer {id} connected; {} streamer(s) active",
                    streamers.len()
                );
                if let Err(e) = handle.send_json(&ServerEvent::ActiveStreamers { streamers }) {
                    warn!("could not send active_streamers to viewer {id}: {e}");
                }
            }
            ConnectionKind::Match => {
                debug!("match connection {id} registered");
            }
        }

        previous.map(|entry| entry.handle)
    }

    /// Removes whatever is registered under `id`.  Returns whether anything
    /// was removed; removing an absent id is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        self.maps.write().await.remove_and_announce(id)
    }

    /// Removes `handle`'s registration, but only if `id` still belongs to
    /// that very connection.  A superseded connection's teardown therefore
    /// never evicts its replacement.
    pub async fn release(&self, handle: &ConnectionHandle) -> bool {
        // Check and removal under one guard; a replacement registered in
        // between would otherwise be evicted.
        let mut maps = self.maps.write().await;
        let current = maps
            .all
            .get(handle.id())
            .is_some_and(|entry| entry.handle.same_connection(handle));
        if !current {
            debug!("{} already replaced or removed; release skipped", handle.id());
            return false;
        }
        maps.remove_and_announce(handle.id())
    }

    pub async fn get(&self, id: &str) -> Option<ConnectionHandle> {
        self.maps
            .read()
            .await
            .all
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    pub async fn kind_of(&self, id: &str) -> Option<ConnectionKind> {
        self.maps.read().await.all.get(id).map(|entry| entry.kind)
    }

    pub async fn is_streamer(&self, id: &str) -> bool {
        self.maps.read().await.streamers.contains_key(id)
    }

    pub async fn list_streamer_ids(&self) -> HashSet<String> {
        self.maps.read().await.streamers.keys().cloned().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.maps.read().await.all.len()
    }

    /// Queues `message` for the connection registered under `id`.
    pub async fn send_to<T: Serialize + ?Sized>(&self, id: &str, message: &T) -> Delivery {
        let maps = self.maps.read().await;
        deliver(id, maps.all.get(id).map(|entry| &entry.handle), message)
    }

    /// Like [`send_to`](Self::send_to), but only if `id` is registered as a
    /// streamer.  Lookup and send share one read guard, so a streamer that
    /// is replaced by a viewer in between never receives the message.
    pub async fn send_to_streamer<T: Serialize + ?Sized>(&self, id: &str, message: &T) -> Delivery {
        let maps = self.maps.read().await;
        deliver(id, maps.streamers.get(id), message)
    }

    /// Sends `event` to every viewer.  Returns how many accepted it.
    pub async fn broadcast_to_viewers(&self, event: &ServerEvent) -> usize {
        self.maps.read().await.broadcast_to_viewers(event)
    }

    /// Closes every registered connection and empties the table.  Returns
    /// how many connections were closed.
    pub async fn close_all(&self, code: CloseCode, reason: &str) -> usize {
        let mut maps = self.maps.write().await;
        let entries: Vec<Entry> = maps.all.drain().map(|(_, entry)| entry).collect();
        maps.streamers.clear();
        maps.viewers.clear();
        // No `streamer_left` here: every viewer is being closed as well.
        for entry in &entries {
            entry.handle.close(code, reason);
        }
        entries.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
