use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::relay::protocol::PresenceStatus;

/// One registered user: the live outbound handle plus the identity
/// binding claimed at handshake time.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub conn_id: Uuid,
    pub sender: mpsc::Sender<Message>,
    pub name: String,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

impl RegistryEntry {
    /// A connection is open while the receiving half of its outbound
    /// channel is still alive.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// The authoritative userId -> connection mapping. At most one entry per
/// user id; all mutation and iteration goes through one coarse lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the entry for `user_id`.
    ///
    /// Replace-on-reauth: a second handshake for the same id silently
    /// takes over routing. The prior connection is not closed or
    /// notified; it stays open but unroutable until it closes on its
    /// own.
    pub async fn register(&self, user_id: &str, entry: RegistryEntry) {
        let mut entries = self.entries.write().await;
        if let Some(previous) = entries.insert(user_id.to_string(), entry) {
            debug!(
                "Replaced connection {} for user {} on re-auth",
                previous.conn_id, user_id
            );
        }
        info!("Registered user {} in connection registry", user_id);
    }

    /// Remove the entry for `user_id`, but only if `conn_id` still owns
    /// it. A connection that was replaced by a newer handshake must not
    /// unregister its successor at close time.
    pub async fn unregister_if_current(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(user_id) {
            Some(entry) if entry.conn_id == conn_id => {
                entries.remove(user_id);
                info!("Removed user {} from connection registry", user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: &str) -> Option<RegistryEntry> {
        self.entries.read().await.get(user_id).cloned()
    }

    /// Push one record to a single user, best-effort. Returns false when
    /// the user is absent, the connection closed, or the push failed;
    /// no failure propagates past the log line.
    pub async fn send_to<T: Serialize>(&self, user_id: &str, record: &T) -> bool {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Failed to serialize record for user {}: {}", user_id, err);
                return false;
            }
        };

        let entries = self.entries.read().await;
        match entries.get(user_id) {
            Some(entry) if entry.is_open() => {
                match entry.sender.try_send(Message::Text(payload)) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("Failed to push to user {}: {}", user_id, err);
                        false
                    }
                }
            }
            _ => false,
        }
    }

    /// Push one record to every currently open connection, the
    /// originator included. An entry that closed mid-iteration is
    /// skipped; a failed push affects no other recipient.
    pub async fn broadcast<T: Serialize>(&self, record: &T) {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Failed to serialize broadcast record: {}", err);
                return;
            }
        };

        let entries = self.entries.read().await;
        for (user_id, entry) in entries.iter() {
            if !entry.is_open() {
                debug!("Skipping closed connection for user {}", user_id);
                continue;
            }
            if let Err(err) = entry.sender.try_send(Message::Text(payload.clone())) {
                warn!("Failed to broadcast to user {}: {}", user_id, err);
            }
        }
    }

    /// Refresh the binding's status and last-seen time. Returns the new
    /// last-seen, or None when the user is not registered.
    pub async fn update_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Option<DateTime<Utc>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(user_id)?;
        let now = Utc::now();
        entry.status = status;
        entry.last_seen = now;
        Some(now)
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.entries.read().await.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.entries.read().await.len()
    }
}
