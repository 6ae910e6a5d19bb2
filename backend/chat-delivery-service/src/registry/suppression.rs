use dashmap::DashSet;

use crate::models::ConversationKey;

/// Prevents repeated push notifications for an ongoing offline conversation.
///
/// A conversation key sits in the set from the moment a notification fires
/// until the receiver clears their backlog via the read-receipt batcher.
/// Between those two points at most one push goes out, no matter how many
/// messages arrive.
#[derive(Default)]
pub struct SuppressionGuard {
    notified: DashSet<ConversationKey>,
}

impl SuppressionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-set: returns true exactly once per offline episode.
    /// Concurrent senders race on the underlying shard lock, so only one of
    /// them observes the insertion.
    pub fn should_notify(&self, key: ConversationKey) -> bool {
        self.notified.insert(key)
    }

    /// Re-arms notification for the next offline episode.
    pub fn clear(&self, key: ConversationKey) {
        self.notified.remove(&key);
    }
}
