use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored chat message between a partner pair.
///
/// Identity fields are immutable after creation; only the read and delete
/// flags change, and each of those transitions at most once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One page of conversation history, newest first.
///
/// `oldest_created_at` is the exclusive cursor for the next page request.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

impl MessagePage {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_more: false,
            oldest_created_at: None,
        }
    }
}

/// Canonical, order-independent identifier for a user pair.
///
/// `ConversationKey::new(a, b) == ConversationKey::new(b, a)`, which makes it
/// usable as the suppression-set key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey(Uuid, Uuid);

impl ConversationKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn participants(&self) -> (Uuid, Uuid) {
        (self.0, self.1)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}
