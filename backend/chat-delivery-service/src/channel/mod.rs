use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::registry::PresenceTracker;

pub mod events;

/// Transport seam for live delivery. Failures here are transient by
/// definition: the caller logs them and falls back to offline semantics, it
/// never propagates them to the sender of a message.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("user has no live session")]
    NotConnected,

    #[error("live session closed")]
    Closed,

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Push one serialized frame to the user's single active session.
    async fn send_to_user(&self, user_id: Uuid, payload: String) -> Result<(), ChannelError>;

    /// Generic announcement to every connected user. Best effort.
    async fn broadcast_public(&self, payload: String);
}

/// Live channel backed by the in-process presence registry: each connected
/// user owns an mpsc session handle whose receiving end is drained by the
/// transport's socket task. Sending never blocks message persistence.
pub struct SessionChannel {
    presence: Arc<PresenceTracker>,
}

impl SessionChannel {
    pub fn new(presence: Arc<PresenceTracker>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl LiveChannel for SessionChannel {
    async fn send_to_user(&self, user_id: Uuid, payload: String) -> Result<(), ChannelError> {
        let session = self
            .presence
            .session(user_id)
            .ok_or(ChannelError::NotConnected)?;

        if session.send(payload).is_err() {
            // The socket task vanished between the presence check and the
            // send; drop the stale entry so later checks see offline.
            self.presence.mark_offline(user_id);
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    async fn broadcast_public(&self, payload: String) {
        let mut stale = Vec::new();
        for user_id in self.presence.online_users() {
            match self.presence.session(user_id) {
                Some(session) if session.send(payload.clone()).is_ok() => {}
                _ => stale.push(user_id),
            }
        }
        for user_id in stale {
            self.presence.mark_offline(user_id);
        }
    }
}
