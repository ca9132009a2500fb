//! Relay core: connection registry, record routing, and presence.
//!
//! This module owns the userId -> connection mapping and the dispatch
//! of inbound records to the handshake, delivery, typing, and status
//! handlers.

mod connection;
mod protocol;
mod registry;
mod server;

pub use connection::Connection;
pub use protocol::{
    decode, AuthAck, ChatMessage, ClientRecord, DeliveryStatus, ErrorRecord, MessageDelivery,
    PresenceStatus, PresenceUpdate, TypingForward,
};
pub use registry::{ConnectionRegistry, RegistryEntry};
pub use server::RelayServer;
