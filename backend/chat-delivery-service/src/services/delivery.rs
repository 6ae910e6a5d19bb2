use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::events::ChannelEvent;
use crate::channel::LiveChannel;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, ConversationKey};
use crate::registry::{ActivityTracker, PresenceTracker, SuppressionGuard};
use crate::services::message_store::MessageStore;
use crate::services::push::PushProvider;

const PUSH_BODY_PREVIEW_CHARS: usize = 120;

/// Decides, for every stored message, whether it goes out over a live
/// connection, stays quiet, or falls back to a push notification.
///
/// Persistence always happens before any delivery attempt; a delivery failure
/// never rolls a message back. The sender gets a definitive answer for "was
/// my message stored", never for "was it instantly delivered".
pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceTracker>,
    activity: Arc<ActivityTracker>,
    suppression: Arc<SuppressionGuard>,
    channel: Arc<dyn LiveChannel>,
    push: Arc<dyn PushProvider>,
    quiet_period: Duration,
    push_timeout: Duration,
}

impl DeliveryRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceTracker>,
        activity: Arc<ActivityTracker>,
        suppression: Arc<SuppressionGuard>,
        channel: Arc<dyn LiveChannel>,
        push: Arc<dyn PushProvider>,
        quiet_period: Duration,
        push_timeout: Duration,
    ) -> Self {
        Self {
            store,
            presence,
            activity,
            suppression,
            channel,
            push,
            quiet_period,
            push_timeout,
        }
    }

    /// Store one message and route its delivery.
    ///
    /// `sender_id` must be the authenticated principal; this crate never
    /// falls back to a client-supplied identity.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<ChatMessage> {
        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "cannot send a message to yourself".into(),
            ));
        }
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content is required".into()));
        }

        // Best-effort pre-read: true only if the receiver is provably viewing
        // this exact conversation right now. The read-receipt batcher remains
        // the authoritative read marker.
        let initial_is_read = self.activity.is_active(receiver_id, sender_id);

        let message = self
            .store
            .append(sender_id, receiver_id, content, initial_is_read)
            .await?;

        if self.presence.is_online(receiver_id) {
            // Terminal happy path: no notification fallback even if the live
            // send fails underneath us.
            self.deliver_live(receiver_id, &message).await;
        } else {
            self.notify_offline(&message).await;
        }

        self.echo_to_sender(&message).await;

        Ok(message)
    }

    async fn deliver_live(&self, receiver_id: Uuid, message: &ChatMessage) {
        let event = ChannelEvent::MessageNew {
            message: message.clone(),
        };
        let payload = match event.to_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize live frame");
                return;
            }
        };

        if let Err(e) = self.channel.send_to_user(receiver_id, payload).await {
            warn!(
                message_id = %message.id,
                %receiver_id,
                error = %e,
                "live delivery failed; receiver will catch up on next page load"
            );
        }
    }

    /// Offline path: a push goes out only at the start of a new offline
    /// episode, and at most once per episode.
    async fn notify_offline(&self, message: &ChatMessage) {
        let prior = match self
            .store
            .latest_before(message.sender_id, message.receiver_id, message.created_at)
            .await
        {
            Ok(prior) => prior,
            Err(e) => {
                // Treat an unknown history as a fresh episode; the guard still
                // caps this conversation at one push.
                warn!(message_id = %message.id, error = %e, "quiet-period lookup failed");
                None
            }
        };

        if let Some(prior_at) = prior {
            if prior_at + self.quiet_period > message.created_at {
                debug!(
                    message_id = %message.id,
                    "prior activity within quiet period; push suppressed"
                );
                return;
            }
        }

        let key = ConversationKey::new(message.sender_id, message.receiver_id);
        if !self.suppression.should_notify(key) {
            debug!(
                message_id = %message.id,
                "offline episode already notified; push suppressed"
            );
            return;
        }

        self.send_push(message).await;
    }

    async fn send_push(&self, message: &ChatMessage) {
        let body: String = message.content.chars().take(PUSH_BODY_PREVIEW_CHARS).collect();
        let data = serde_json::json!({
            "type": "chat.message",
            "message_id": message.id,
            "sender_id": message.sender_id,
        });

        // Bounded, never retried synchronously. On failure the suppression
        // entry stays in place, so repeated provider outages cannot turn into
        // notification storms.
        let attempt = tokio::time::timeout(
            self.push_timeout,
            self.push
                .send(message.receiver_id, "New message", &body, data),
        )
        .await;

        match attempt {
            Ok(Ok(())) => {
                info!(message_id = %message.id, receiver_id = %message.receiver_id, "push notification dispatched");
            }
            Ok(Err(e)) => {
                warn!(message_id = %message.id, error = %e, "push notification failed");
            }
            Err(_) => {
                warn!(message_id = %message.id, "push notification timed out");
            }
        }
    }

    /// Send confirmation back to the sender's own session, independent of the
    /// receiver-side outcome. Dropped silently when the sender is offline.
    async fn echo_to_sender(&self, message: &ChatMessage) {
        if !self.presence.is_online(message.sender_id) {
            return;
        }

        let event = ChannelEvent::MessageSent {
            message: message.clone(),
        };
        match event.to_payload() {
            Ok(payload) => {
                if let Err(e) = self.channel.send_to_user(message.sender_id, payload).await {
                    debug!(message_id = %message.id, error = %e, "sender echo dropped");
                }
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize echo frame");
            }
        }
    }
}
