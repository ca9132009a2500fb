use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::relay::protocol::{
    self, AuthAck, ChatMessage, ClientRecord, ErrorRecord, MessageDelivery, PresenceStatus,
    PresenceUpdate, TypingForward,
};
use crate::relay::registry::{ConnectionRegistry, RegistryEntry};

/// One live transport session, bound (or not yet bound) to a user
/// identity. Inbound records are handled to completion, one at a time;
/// everything outbound goes through the non-blocking `tx` handle.
pub struct Connection {
    id: Uuid,
    tx: mpsc::Sender<Message>,
    registry: Arc<ConnectionRegistry>,
    // The id this connection last bound via handshake. Kept here so the
    // close path never has to re-derive ownership from the registry,
    // which may already belong to a newer connection.
    bound_user: Option<String>,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<Message>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            registry,
            bound_user: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bound_user(&self) -> Option<&str> {
        self.bound_user.as_deref()
    }

    pub async fn handle_frame(&mut self, msg: Message) {
        match msg {
            Message::Text(text) => self.handle_record(&text).await,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => self.handle_record(&text).await,
                Err(_) => {
                    warn!("Non-UTF-8 binary frame on connection {}", self.id);
                    self.push(&ErrorRecord::invalid_format());
                }
            },
            Message::Ping(data) => {
                if let Err(e) = self.tx.try_send(Message::Pong(data)) {
                    warn!("Failed to send pong on connection {}: {}", self.id, e);
                }
            }
            Message::Pong(_) => {}
            Message::Close(_) => {}
            _ => {
                warn!("Received unsupported frame type on connection {}", self.id);
            }
        }
    }

    async fn handle_record(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(ClientRecord::Auth {
                user_id,
                user_name,
                user_avatar,
            }) => self.handle_auth(user_id, user_name, user_avatar).await,
            Ok(ClientRecord::Message(message)) => self.handle_chat(message).await,
            Ok(ClientRecord::Typing {
                sender_id,
                recipient_id,
                is_typing,
            }) => self.handle_typing(&sender_id, &recipient_id, is_typing).await,
            Ok(ClientRecord::Status { user_id, status }) => {
                self.handle_status(&user_id, status).await
            }
            Err(ProtocolError::UnknownType(ty)) => {
                debug!("Ignoring record of unknown type {:?} on connection {}", ty, self.id);
            }
            Err(ProtocolError::Malformed(e)) => {
                warn!("Malformed record on connection {}: {}", self.id, e);
                self.push(&ErrorRecord::invalid_format());
            }
        }
    }

    /// Session handshake: bind the claimed identity, ack on this
    /// connection, then announce `online` to everyone. The claim is
    /// trusted as-is.
    async fn handle_auth(
        &mut self,
        user_id: String,
        user_name: String,
        user_avatar: Option<String>,
    ) {
        let now = Utc::now();
        let entry = RegistryEntry {
            conn_id: self.id,
            sender: self.tx.clone(),
            name: user_name,
            avatar: user_avatar,
            status: PresenceStatus::Online,
            last_seen: now,
        };
        self.registry.register(&user_id, entry).await;
        self.bound_user = Some(user_id.clone());
        info!("User {} authenticated on connection {}", user_id, self.id);

        // Ack must precede the presence broadcast on this connection
        self.push(&AuthAck::new(&user_id));
        self.registry
            .broadcast(&PresenceUpdate::announce(&user_id, PresenceStatus::Online, now))
            .await;
    }

    /// Direct-message delivery: echo a `delivered` copy to the sender,
    /// forward the annotated original to the recipient. Best-effort,
    /// at-most-once; an unreachable recipient drops the message.
    async fn handle_chat(&self, message: ChatMessage) {
        debug!(
            "Message from {} to {} on connection {}",
            message.sender_id, message.recipient_id, self.id
        );

        // Stamped before the recipient lookup: "delivered" records the
        // routing attempt, not a read receipt.
        let delivered_at = Utc::now();
        let echo = MessageDelivery::echo(&message, delivered_at);
        if !self.registry.send_to(&message.sender_id, &echo).await {
            debug!("No routable connection for sender {}, echo dropped", message.sender_id);
        }

        let forward = MessageDelivery::forward(&message);
        if self.registry.send_to(&message.recipient_id, &forward).await {
            debug!("Message delivered to {}", message.recipient_id);
        } else {
            debug!("User {} unreachable, message dropped", message.recipient_id);
        }
    }

    /// Typing state is disposable; an offline recipient just misses it.
    async fn handle_typing(&self, sender_id: &str, recipient_id: &str, is_typing: bool) {
        let forward = TypingForward::new(sender_id, is_typing);
        if !self.registry.send_to(recipient_id, &forward).await {
            debug!("User {} unreachable, typing event dropped", recipient_id);
        }
    }

    async fn handle_status(&self, user_id: &str, status: PresenceStatus) {
        match self.registry.update_status(user_id, status).await {
            Some(last_seen) => {
                self.registry
                    .broadcast(&PresenceUpdate::refreshed(user_id, status, last_seen))
                    .await;
            }
            None => {
                debug!("Status update for unregistered user {}, ignored", user_id);
            }
        }
    }

    /// Close-time cleanup: unregister only if this connection still owns
    /// its registry entry, and announce `offline` when it did. A stale
    /// (replaced) connection closing must produce no broadcast.
    pub async fn close(&mut self) {
        if let Some(user_id) = self.bound_user.take() {
            if self.registry.unregister_if_current(&user_id, self.id).await {
                info!("User {} disconnected", user_id);
                self.registry
                    .broadcast(&PresenceUpdate::announce(
                        &user_id,
                        PresenceStatus::Offline,
                        Utc::now(),
                    ))
                    .await;
            }
        }
    }

    fn push<T: Serialize>(&self, record: &T) {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize record for connection {}: {}", self.id, e);
                return;
            }
        };

        if let Err(e) = self.tx.try_send(Message::Text(payload)) {
            warn!("Failed to push to connection {}: {}", self.id, e);
        }
    }
}
