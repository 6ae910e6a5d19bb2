use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, MessagePage};

pub const PAGE_LIMIT_MAX: i64 = 100;

/// Shared argument validation for the paging operations, so every store
/// implementation enforces the same contract.
pub fn validate_page_args(user_a: Uuid, user_b: Uuid, limit: i64) -> AppResult<()> {
    if user_a == user_b {
        return Err(AppError::BadRequest(
            "a conversation requires two distinct users".into(),
        ));
    }
    if !(1..=PAGE_LIMIT_MAX).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "page limit must be within 1..={PAGE_LIMIT_MAX}"
        )));
    }
    Ok(())
}

/// Fold a `limit + 1` fetch into a page: the extra row only proves that an
/// older message exists.
pub fn page_from_rows(mut rows: Vec<ChatMessage>, limit: i64) -> MessagePage {
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    let oldest_created_at = rows.last().map(|m| m.created_at);
    MessagePage {
        messages: rows,
        has_more,
        oldest_created_at,
    }
}

/// Durable, ordered append-only log of chat messages between user pairs.
///
/// The trait is the seam that lets the delivery pipeline run against the
/// Postgres store in production and an in-memory store in tests.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message. Fails with `NotFound` when either participant id
    /// is unknown.
    ///
    /// Every message of a pair gets a `created_at` strictly later than the
    /// pair's previous one, so a timestamp cursor partitions the history
    /// without gaps.
    async fn append(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        initial_is_read: bool,
    ) -> AppResult<ChatMessage>;

    /// Conversation history, newest first. With a cursor, only messages
    /// strictly older than it are returned.
    async fn page(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage>;

    /// Case-insensitive substring search over non-deleted content, paginated
    /// like `page`. A blank keyword yields an empty page by policy, not an
    /// error.
    async fn search(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        keyword: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage>;

    /// Unread, non-deleted backlog from one sender, in no particular order.
    async fn unread_from(&self, receiver_id: Uuid, sender_id: Uuid) -> AppResult<Vec<ChatMessage>>;

    /// Atomic bulk read-mark. Counting contract: only rows that actually
    /// transition from unread to read contribute to the returned count;
    /// already-read rows are left untouched and contribute zero.
    async fn mark_read(&self, message_ids: &[Uuid], read_at: DateTime<Utc>) -> AppResult<u64>;

    /// Soft delete by the owning sender. Idempotent: deleting an
    /// already-deleted message returns the current row without error.
    async fn soft_delete(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<ChatMessage>;

    /// Irreversible hard delete of a pair's entire history (partner unlink).
    async fn purge_conversation(&self, user_a: Uuid, user_b: Uuid) -> AppResult<u64>;

    /// Timestamp of the most recent non-deleted message between the pair
    /// strictly older than `before`. Drives the quiet-period decision.
    async fn latest_before(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>>;
}

pub struct PgMessageStore {
    db: Pool<Postgres>,
}

const APPEND_RETRIES: usize = 3;

fn is_pair_timestamp_conflict(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.constraint())
        .is_some_and(|c| c == "uniq_messages_pair_created_at")
}

impl PgMessageStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    async fn ensure_participants(&self, sender_id: Uuid, receiver_id: Uuid) -> AppResult<()> {
        let known: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = $1 OR id = $2")
                .bind(sender_id)
                .bind(receiver_id)
                .fetch_one(&self.db)
                .await?;
        if known != 2 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        initial_is_read: bool,
    ) -> Result<ChatMessage, sqlx::Error> {
        // The timestamp is bumped one microsecond past the pair's newest row;
        // a pre-read message gets read_at == created_at.
        sqlx::query_as::<_, ChatMessage>(
            r#"WITH t AS (
                   SELECT GREATEST(
                       CLOCK_TIMESTAMP(),
                       COALESCE(
                           (SELECT MAX(created_at) + INTERVAL '1 microsecond'
                              FROM messages
                             WHERE LEAST(sender_id, receiver_id) = LEAST($2, $3)
                               AND GREATEST(sender_id, receiver_id) = GREATEST($2, $3)),
                           '-infinity'::timestamptz)
                   ) AS ts
               )
               INSERT INTO messages (id, sender_id, receiver_id, content, created_at, is_read, read_at)
               SELECT $1, $2, $3, $4, ts, $5, CASE WHEN $5 THEN ts END FROM t
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .bind(initial_is_read)
        .fetch_one(&self.db)
        .await
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        initial_is_read: bool,
    ) -> AppResult<ChatMessage> {
        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "a conversation requires two distinct users".into(),
            ));
        }
        self.ensure_participants(sender_id, receiver_id).await?;

        // Concurrent inserts on different connections can still draw the same
        // microsecond; the unique pair index rejects the tie and a retry
        // draws a later timestamp.
        let mut attempts = 0;
        loop {
            match self
                .insert_message(sender_id, receiver_id, content, initial_is_read)
                .await
            {
                Ok(message) => return Ok(message),
                Err(e) if is_pair_timestamp_conflict(&e) && attempts < APPEND_RETRIES => {
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn page(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        validate_page_args(user_a, user_b, limit)?;

        let rows = sqlx::query_as::<_, ChatMessage>(
            r#"SELECT * FROM messages
               WHERE LEAST(sender_id, receiver_id) = LEAST($1, $2)
                 AND GREATEST(sender_id, receiver_id) = GREATEST($1, $2)
                 AND ($3::timestamptz IS NULL OR created_at < $3)
               ORDER BY created_at DESC, id DESC
               LIMIT $4"#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(&self.db)
        .await?;

        Ok(page_from_rows(rows, limit))
    }

    async fn search(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        keyword: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        validate_page_args(user_a, user_b, limit)?;

        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(MessagePage::empty());
        }

        let escaped = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");

        let rows = sqlx::query_as::<_, ChatMessage>(
            r#"SELECT * FROM messages
               WHERE LEAST(sender_id, receiver_id) = LEAST($1, $2)
                 AND GREATEST(sender_id, receiver_id) = GREATEST($1, $2)
                 AND is_deleted = FALSE
                 AND content ILIKE $3 ESCAPE '\'
                 AND ($4::timestamptz IS NULL OR created_at < $4)
               ORDER BY created_at DESC, id DESC
               LIMIT $5"#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(pattern)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(&self.db)
        .await?;

        Ok(page_from_rows(rows, limit))
    }

    async fn unread_from(&self, receiver_id: Uuid, sender_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessage>(
            r#"SELECT * FROM messages
               WHERE receiver_id = $1 AND sender_id = $2
                 AND is_read = FALSE AND is_deleted = FALSE"#,
        )
        .bind(receiver_id)
        .bind(sender_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn mark_read(&self, message_ids: &[Uuid], read_at: DateTime<Utc>) -> AppResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"UPDATE messages
               SET is_read = TRUE, read_at = $2
               WHERE id = ANY($1) AND is_read = FALSE"#,
        )
        .bind(message_ids)
        .bind(read_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn soft_delete(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<ChatMessage> {
        let message = sqlx::query_as::<_, ChatMessage>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if message.is_deleted {
            return Ok(message);
        }

        let deleted = sqlx::query_as::<_, ChatMessage>(
            r#"UPDATE messages
               SET is_deleted = TRUE, deleted_at = NOW()
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(message_id)
        .fetch_one(&self.db)
        .await?;

        Ok(deleted)
    }

    async fn purge_conversation(&self, user_a: Uuid, user_b: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM messages
               WHERE LEAST(sender_id, receiver_id) = LEAST($1, $2)
                 AND GREATEST(sender_id, receiver_id) = GREATEST($1, $2)"#,
        )
        .bind(user_a)
        .bind(user_b)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn latest_before(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"SELECT MAX(created_at) FROM messages
               WHERE LEAST(sender_id, receiver_id) = LEAST($1, $2)
                 AND GREATEST(sender_id, receiver_id) = GREATEST($1, $2)
                 AND is_deleted = FALSE
                 AND created_at < $3"#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(before)
        .fetch_one(&self.db)
        .await?;

        Ok(latest)
    }
}
