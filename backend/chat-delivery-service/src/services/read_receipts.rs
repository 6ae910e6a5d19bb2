use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::events::ChannelEvent;
use crate::channel::LiveChannel;
use crate::error::AppResult;
use crate::models::ConversationKey;
use crate::registry::{PresenceTracker, SuppressionGuard};
use crate::services::message_store::MessageStore;

/// Marks a receiver's unread backlog from one sender as read in one step and
/// broadcasts a single consolidated confirmation.
pub struct ReadReceiptBatcher {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceTracker>,
    suppression: Arc<SuppressionGuard>,
    channel: Arc<dyn LiveChannel>,
}

impl ReadReceiptBatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceTracker>,
        suppression: Arc<SuppressionGuard>,
        channel: Arc<dyn LiveChannel>,
    ) -> Self {
        Self {
            store,
            presence,
            suppression,
            channel,
        }
    }

    /// Returns the number of messages that transitioned to read.
    ///
    /// An empty backlog is a complete no-op: no broadcast and no suppression
    /// clear, so an armed offline episode stays armed until real messages are
    /// caught up.
    pub async fn mark_all_read(&self, reader_id: Uuid, sender_id: Uuid) -> AppResult<u64> {
        let unread = self.store.unread_from(reader_id, sender_id).await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let read_at = Utc::now();
        let message_ids: Vec<Uuid> = unread.iter().map(|m| m.id).collect();
        let updated = self.store.mark_read(&message_ids, read_at).await?;

        if self.presence.is_online(sender_id) {
            let event = ChannelEvent::MessagesRead {
                reader_id,
                message_ids,
                read_at,
            };
            match event.to_payload() {
                Ok(payload) => {
                    if let Err(e) = self.channel.send_to_user(sender_id, payload).await {
                        // Receipts are informational; a missed confirmation is
                        // not persisted or retried.
                        debug!(%reader_id, %sender_id, error = %e, "read confirmation dropped");
                    }
                }
                Err(e) => {
                    warn!(%reader_id, %sender_id, error = %e, "failed to serialize read confirmation");
                }
            }
        }

        self.suppression
            .clear(ConversationKey::new(reader_id, sender_id));

        Ok(updated)
    }
}
