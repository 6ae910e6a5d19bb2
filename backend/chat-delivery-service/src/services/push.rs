use std::sync::Arc;

use async_trait::async_trait;
use fcm::{Client, MessageBuilder, NotificationBuilder};
use sqlx::{Pool, Postgres};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::FcmConfig;

/// Push failures never reach the sender of a message; the delivery router
/// logs them and moves on. The invalid-token case is surfaced distinctly so
/// the host application can trigger token cleanup.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("no active device token registered")]
    NoDevice,

    #[error("device token rejected by provider")]
    InvalidToken,

    #[error("push provider failure: {0}")]
    Provider(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// Tokens are logged by prefix only; char-based so a multi-byte token cannot
// split mid-character.
fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), PushError>;
}

/// FCM (Firebase Cloud Messaging) push notification provider.
///
/// Resolves the recipient's most recently used active device token; token
/// registration and cleanup belong to the notification edge, not here.
#[derive(Clone)]
pub struct FcmPush {
    client: Arc<Client>,
    api_key: String,
    db: Pool<Postgres>,
}

impl FcmPush {
    pub fn new(cfg: &FcmConfig, db: Pool<Postgres>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            api_key: cfg.api_key.clone(),
            db,
        }
    }

    async fn device_token(&self, user_id: Uuid) -> Result<String, PushError> {
        let token: Option<String> = sqlx::query_scalar(
            r#"SELECT device_token FROM device_tokens
               WHERE user_id = $1 AND is_active = TRUE
               ORDER BY last_used_at DESC
               LIMIT 1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        token.ok_or(PushError::NoDevice)
    }
}

#[async_trait]
impl PushProvider for FcmPush {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), PushError> {
        let device_token = self.device_token(user_id).await?;

        let mut notification_builder = NotificationBuilder::new();
        notification_builder.title(title).body(body).sound("default");
        let notification = notification_builder.finalize();

        let mut message_builder = MessageBuilder::new(&self.api_key, &device_token);
        message_builder.notification(notification);
        message_builder
            .data(&data)
            .map_err(|e| PushError::Provider(e.to_string()))?;

        let message = message_builder.finalize();

        match self.client.send(message).await {
            Ok(response) => {
                info!(
                    %user_id,
                    token_prefix = %token_prefix(&device_token),
                    message_id = ?response.message_id,
                    "push notification sent"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    %user_id,
                    token_prefix = %token_prefix(&device_token),
                    error = %e,
                    "push notification send failed"
                );
                Err(PushError::Provider(e.to_string()))
            }
        }
    }
}

/// Stand-in provider used when no FCM key is configured: logs and succeeds,
/// so the suppression guard still tracks episodes consistently.
#[derive(Debug, Default, Clone)]
pub struct DisabledPush;

#[async_trait]
impl PushProvider for DisabledPush {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        _body: &str,
        _data: serde_json::Value,
    ) -> Result<(), PushError> {
        tracing::debug!(%user_id, %title, "push delivery disabled; notification skipped");
        Ok(())
    }
}
