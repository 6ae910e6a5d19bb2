//! Live-channel event frames.
//!
//! All frames follow the "object.action" naming convention and share one flat
//! JSON structure:
//!
//! ```json
//! {
//!     "type": "message.new",
//!     "timestamp": "2026-08-25T10:30:00Z",
//!     ...event-specific fields...
//! }
//! ```
//!
//! Serialization is centralized in `to_payload`; handlers never build frame
//! JSON by hand.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ChatMessage;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChannelEvent {
    /// New message delivered to the receiver's live session.
    MessageNew { message: ChatMessage },

    /// Echo of a persisted message back to its sender as send confirmation.
    MessageSent { message: ChatMessage },

    /// Consolidated read confirmation: one frame per `mark_all_read`, listing
    /// every message id that transitioned.
    MessagesRead {
        reader_id: Uuid,
        message_ids: Vec<Uuid>,
        read_at: DateTime<Utc>,
    },

    /// A sender soft-deleted one of their messages.
    MessageDeleted { message_id: Uuid, deleted_by: Uuid },

    /// Public "user joined" announcement.
    UserJoined { user_id: Uuid },
}

impl ChannelEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message.new",
            Self::MessageSent { .. } => "message.sent",
            Self::MessagesRead { .. } => "messages.read",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::UserJoined { .. } => "user.joined",
        }
    }

    /// Serialize to the flat broadcast frame. This is the only place where
    /// frame serialization happens.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        // Flatten event-specific fields into the frame
        let event_data = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = event_data {
            for (key, value) in map {
                payload[key] = value;
            }
        }

        serde_json::to_string(&payload)
    }
}
