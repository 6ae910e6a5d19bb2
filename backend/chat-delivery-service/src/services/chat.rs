use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channel::events::ChannelEvent;
use crate::channel::{LiveChannel, SessionChannel};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{ChatMessage, ConversationKey, MessagePage};
use crate::registry::{ActivityTracker, PresenceTracker, SessionSender, SuppressionGuard};
use crate::services::delivery::DeliveryRouter;
use crate::services::message_store::{MessageStore, PgMessageStore};
use crate::services::push::{DisabledPush, FcmPush, PushProvider};
use crate::services::read_receipts::ReadReceiptBatcher;
use crate::state::AppState;

/// Typed call surface of the chat core. The transport layer resolves the
/// authenticated principal and hands ids down; nothing here trusts a
/// client-supplied sender identity.
pub struct ChatService {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceTracker>,
    activity: Arc<ActivityTracker>,
    suppression: Arc<SuppressionGuard>,
    channel: Arc<dyn LiveChannel>,
    router: DeliveryRouter,
    receipts: ReadReceiptBatcher,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceTracker>,
        activity: Arc<ActivityTracker>,
        suppression: Arc<SuppressionGuard>,
        channel: Arc<dyn LiveChannel>,
        push: Arc<dyn PushProvider>,
        config: &Config,
    ) -> Self {
        let router = DeliveryRouter::new(
            store.clone(),
            presence.clone(),
            activity.clone(),
            suppression.clone(),
            channel.clone(),
            push,
            config.quiet_period,
            config.push_timeout,
        );
        let receipts = ReadReceiptBatcher::new(
            store.clone(),
            presence.clone(),
            suppression.clone(),
            channel.clone(),
        );

        Self {
            store,
            presence,
            activity,
            suppression,
            channel,
            router,
            receipts,
        }
    }

    /// Production wiring: Postgres store, session-backed live channel, FCM
    /// push when configured.
    pub fn from_state(state: &AppState) -> Self {
        let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(state.db.clone()));
        let channel: Arc<dyn LiveChannel> = Arc::new(SessionChannel::new(state.presence.clone()));
        let push: Arc<dyn PushProvider> = match state.config.fcm.as_ref() {
            Some(fcm_cfg) => Arc::new(FcmPush::new(fcm_cfg, state.db.clone())),
            None => {
                warn!("FCM_API_KEY not set; push delivery disabled");
                Arc::new(DisabledPush)
            }
        };

        Self::new(
            store,
            state.presence.clone(),
            state.activity.clone(),
            state.suppression.clone(),
            channel,
            push,
            &state.config,
        )
    }

    /// `sender_id` is the authenticated principal of the live connection or
    /// HTTP request; the router rejects self-conversations and blank content.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> AppResult<ChatMessage> {
        self.router.send_message(sender_id, receiver_id, content).await
    }

    pub async fn mark_conversation_read(&self, reader_id: Uuid, sender_id: Uuid) -> AppResult<u64> {
        self.receipts.mark_all_read(reader_id, sender_id).await
    }

    pub fn enter_conversation(&self, user_id: Uuid, partner_id: Uuid) {
        self.activity.enter(user_id, partner_id);
    }

    pub fn leave_conversation(&self, user_id: Uuid, partner_id: Uuid) {
        self.activity.leave(user_id, partner_id);
    }

    /// Registers the user's live session and announces the arrival. A second
    /// connection from the same user supersedes the first for presence
    /// purposes.
    pub async fn connect(&self, user_id: Uuid, session: SessionSender) {
        self.presence.mark_online(user_id, session);
        info!(%user_id, "user connected");

        match (ChannelEvent::UserJoined { user_id }).to_payload() {
            Ok(payload) => self.channel.broadcast_public(payload).await,
            Err(e) => warn!(%user_id, error = %e, "failed to serialize join announcement"),
        }
    }

    /// Voluntary disconnect, abrupt socket loss and re-auth failure all land
    /// here: the user goes offline and stops counting as viewing anything.
    pub fn disconnect(&self, user_id: Uuid) {
        self.presence.mark_offline(user_id);
        self.activity.disconnect_all(user_id);
        info!(%user_id, "user disconnected");
    }

    pub async fn get_page(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        self.store.page(user_a, user_b, before, limit).await
    }

    pub async fn search_messages(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        keyword: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        self.store.search(user_a, user_b, keyword, before, limit).await
    }

    /// Soft delete by the owning sender; the counterparty's open client gets
    /// a `message.deleted` frame so it can drop the bubble.
    pub async fn delete_message(&self, requester_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self.store.soft_delete(message_id, requester_id).await?;

        let counterparty = message.receiver_id;
        if self.presence.is_online(counterparty) {
            let event = ChannelEvent::MessageDeleted {
                message_id: message.id,
                deleted_by: requester_id,
            };
            match event.to_payload() {
                Ok(payload) => {
                    if let Err(e) = self.channel.send_to_user(counterparty, payload).await {
                        warn!(%message_id, error = %e, "delete frame dropped");
                    }
                }
                Err(e) => warn!(%message_id, error = %e, "failed to serialize delete frame"),
            }
        }

        Ok(())
    }

    /// Partner unlink: hard-deletes the pair's history and resets their
    /// suppression state so a future re-link starts from a clean slate.
    pub async fn purge_conversation(&self, user_a: Uuid, user_b: Uuid) -> AppResult<u64> {
        let removed = self.store.purge_conversation(user_a, user_b).await?;
        self.suppression.clear(ConversationKey::new(user_a, user_b));
        info!(%user_a, %user_b, removed, "conversation purged");
        Ok(removed)
    }
}
