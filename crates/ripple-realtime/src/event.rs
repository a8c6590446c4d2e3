//! Typed wire envelope for frames pushed over a live connection.
//!
//! Every structured frame carries a `type` discriminator so clients can
//! dispatch without sniffing the payload shape.

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Discriminator carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "MESSAGE")]
    Message,
}

/// Envelope wrapping a payload for delivery over a socket.
///
/// Serializes as `{"message": <payload>, "type": "MESSAGE"}`.
#[derive(Debug, Clone, Serialize)]
pub struct SocketEvent<T> {
    pub message: T,
    #[serde(rename = "type")]
    pub kind: EventKind,
}

impl<T: Serialize> SocketEvent<T> {
    /// Wrap a chat message payload.
    pub fn message(payload: T) -> Self {
        Self {
            message: payload,
            kind: EventKind::Message,
        }
    }

    /// Encode the envelope as a text frame.
    pub fn to_frame(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}
