use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Record types the router dispatches on. Anything else is logged and
/// ignored rather than answered with an error record.
const RECORD_TYPES: [&str; 4] = ["auth", "message", "typing", "status"];

/// Presence status carried by bindings and status broadcasts. `read` is
/// a transient marker, not a persistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
}

/// A direct message in flight. Exists for the duration of one routing
/// pass; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Closed union of inbound client records, tagged by the `type` field.
/// Field names are the wire contract and must not change.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRecord {
    #[serde(rename = "auth", rename_all = "camelCase")]
    Auth {
        user_id: String,
        user_name: String,
        // The reference client omits the avatar on some devices
        #[serde(default)]
        user_avatar: Option<String>,
    },
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        sender_id: String,
        recipient_id: String,
        is_typing: bool,
    },
    #[serde(rename = "status", rename_all = "camelCase")]
    Status {
        user_id: String,
        status: PresenceStatus,
    },
}

/// Decode one inbound text payload into a `ClientRecord`.
///
/// Distinguishes structurally malformed input (answered with an `error`
/// record by the caller) from well-formed JSON whose declared type
/// matches no handler (ignored by the caller).
pub fn decode(text: &str) -> Result<ClientRecord, ProtocolError> {
    match serde_json::from_str::<ClientRecord>(text) {
        Ok(record) => Ok(record),
        Err(err) => {
            let declared = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|value| {
                    value
                        .get("type")
                        .and_then(|ty| ty.as_str().map(str::to_string))
                });

            match declared {
                Some(ty) if !RECORD_TYPES.contains(&ty.as_str()) => {
                    Err(ProtocolError::UnknownType(ty))
                }
                _ => Err(ProtocolError::Malformed(err.to_string())),
            }
        }
    }
}

/// Handshake acknowledgement, sent synchronously on the authenticating
/// connection before the `online` presence broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAck {
    #[serde(rename = "type")]
    record_type: &'static str,
    status: &'static str,
    pub user_id: String,
}

impl AuthAck {
    pub fn new(user_id: &str) -> Self {
        Self {
            record_type: "status",
            status: "authenticated",
            user_id: user_id.to_string(),
        }
    }
}

/// Presence broadcast. Online/offline announcements carry `timestamp`;
/// explicit status refreshes carry `lastSeen` instead. Both shapes are
/// part of the wire contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    #[serde(rename = "type")]
    record_type: &'static str,
    pub user_id: String,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PresenceUpdate {
    /// An online/offline announcement stamped with the current time.
    pub fn announce(user_id: &str, status: PresenceStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            record_type: "status",
            user_id: user_id.to_string(),
            status,
            last_seen: None,
            timestamp: Some(timestamp),
        }
    }

    /// An explicit status refresh carrying the binding's new last-seen.
    pub fn refreshed(user_id: &str, status: PresenceStatus, last_seen: DateTime<Utc>) -> Self {
        Self {
            record_type: "status",
            user_id: user_id.to_string(),
            status,
            last_seen: Some(last_seen),
            timestamp: None,
        }
    }
}

/// Outbound copy of a routed message: the original fields annotated with
/// `deliveryStatus`, plus `deliveredAt` on the sender echo only.
/// "Delivered" here means the routing attempt happened in-process, not
/// that the recipient read anything.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivery {
    #[serde(rename = "type")]
    record_type: &'static str,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl MessageDelivery {
    /// The confirmation copy pushed back to the sender.
    pub fn echo(message: &ChatMessage, delivered_at: DateTime<Utc>) -> Self {
        Self {
            record_type: "message",
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp,
            delivery_status: DeliveryStatus::Delivered,
            delivered_at: Some(delivered_at),
        }
    }

    /// The annotated copy forwarded to the recipient.
    pub fn forward(message: &ChatMessage) -> Self {
        Self {
            record_type: "message",
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp,
            delivery_status: DeliveryStatus::Delivered,
            delivered_at: None,
        }
    }
}

/// Minimal typing event relayed to a single recipient.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingForward {
    #[serde(rename = "type")]
    record_type: &'static str,
    pub user_id: String,
    pub is_typing: bool,
}

impl TypingForward {
    pub fn new(sender_id: &str, is_typing: bool) -> Self {
        Self {
            record_type: "typing",
            user_id: sender_id.to_string(),
            is_typing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    record_type: &'static str,
    pub message: String,
}

impl ErrorRecord {
    /// The one error response clients ever see: malformed input.
    pub fn invalid_format() -> Self {
        Self {
            record_type: "error",
            message: "Invalid message format".to_string(),
        }
    }
}
