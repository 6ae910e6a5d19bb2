#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

use chat_delivery_service::channel::SessionChannel;
use chat_delivery_service::config::Config;
use chat_delivery_service::error::{AppError, AppResult};
use chat_delivery_service::models::{ChatMessage, MessagePage};
use chat_delivery_service::registry::{ActivityTracker, PresenceTracker, SuppressionGuard};
use chat_delivery_service::services::message_store::{
    page_from_rows, validate_page_args, MessageStore,
};
use chat_delivery_service::services::push::{PushError, PushProvider};
use chat_delivery_service::ChatService;

/// Deterministic in-memory message store mirroring the Postgres semantics.
///
/// Drives its own clock: an append takes the current clock reading, bumped
/// one microsecond past the pair's newest message when the clock has not
/// moved, and tests jump the clock forward to cross the quiet period.
pub struct InMemoryMessageStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    users: HashSet<Uuid>,
    messages: Vec<ChatMessage>,
    now: DateTime<Utc>,
}

fn pair_matches(m: &ChatMessage, a: Uuid, b: Uuid) -> bool {
    (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                users: HashSet::new(),
                messages: Vec::new(),
                now: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            }),
        }
    }

    pub fn register_user(&self, user_id: Uuid) {
        self.inner.lock().unwrap().users.insert(user_id);
    }

    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.now = inner.now + by;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    pub fn get(&self, message_id: Uuid) -> Option<ChatMessage> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub fn all_between(&self, a: Uuid, b: Uuid) -> Vec<ChatMessage> {
        let mut out: Vec<ChatMessage> = self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| pair_matches(m, a, b))
            .cloned()
            .collect();
        out.sort_by(|x, y| y.created_at.cmp(&x.created_at).then(y.id.cmp(&x.id)));
        out
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
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

        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains(&sender_id) || !inner.users.contains(&receiver_id) {
            return Err(AppError::NotFound);
        }

        let pair_latest = inner
            .messages
            .iter()
            .filter(|m| pair_matches(m, sender_id, receiver_id))
            .map(|m| m.created_at)
            .max();
        let created_at = match pair_latest {
            Some(latest) if latest >= inner.now => latest + Duration::from_micros(1),
            _ => inner.now,
        };

        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at,
            is_read: initial_is_read,
            read_at: initial_is_read.then_some(created_at),
            is_deleted: false,
            deleted_at: None,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn page(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        validate_page_args(user_a, user_b, limit)?;

        let mut rows: Vec<ChatMessage> = self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| pair_matches(m, user_a, user_b))
            .filter(|m| before.map_or(true, |cursor| m.created_at < cursor))
            .cloned()
            .collect();
        rows.sort_by(|x, y| y.created_at.cmp(&x.created_at).then(y.id.cmp(&x.id)));
        rows.truncate(limit as usize + 1);

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

        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Ok(MessagePage::empty());
        }

        let mut rows: Vec<ChatMessage> = self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| pair_matches(m, user_a, user_b))
            .filter(|m| !m.is_deleted)
            .filter(|m| m.content.to_lowercase().contains(&keyword))
            .filter(|m| before.map_or(true, |cursor| m.created_at < cursor))
            .cloned()
            .collect();
        rows.sort_by(|x, y| y.created_at.cmp(&x.created_at).then(y.id.cmp(&x.id)));
        rows.truncate(limit as usize + 1);

        Ok(page_from_rows(rows, limit))
    }

    async fn unread_from(&self, receiver_id: Uuid, sender_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| {
                m.receiver_id == receiver_id
                    && m.sender_id == sender_id
                    && !m.is_read
                    && !m.is_deleted
            })
            .cloned()
            .collect())
    }

    async fn mark_read(&self, message_ids: &[Uuid], read_at: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for m in inner.messages.iter_mut() {
            if message_ids.contains(&m.id) && !m.is_read {
                m.is_read = true;
                m.read_at = Some(read_at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn soft_delete(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<ChatMessage> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(AppError::NotFound)?;

        if message.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if !message.is_deleted {
            message.is_deleted = true;
            message.deleted_at = Some(now);
        }
        Ok(message.clone())
    }

    async fn purge_conversation(&self, user_a: Uuid, user_b: Uuid) -> AppResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.messages.len();
        inner.messages.retain(|m| !pair_matches(m, user_a, user_b));
        Ok((before - inner.messages.len()) as u64)
    }

    async fn latest_before(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        before: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| pair_matches(m, user_a, user_b))
            .filter(|m| !m.is_deleted)
            .filter(|m| m.created_at < before)
            .map(|m| m.created_at)
            .max())
    }
}

#[derive(Debug, Clone)]
pub struct PushRecord {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Push provider double that records every call and can be switched to fail.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<PushRecord>>,
    fail: AtomicBool,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<PushRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), PushError> {
        self.sent.lock().unwrap().push(PushRecord {
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(PushError::Provider("injected failure".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub service: ChatService,
    pub store: Arc<InMemoryMessageStore>,
    pub push: Arc<RecordingPush>,
    pub presence: Arc<PresenceTracker>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryMessageStore::new());
        let push = Arc::new(RecordingPush::new());
        let presence = Arc::new(PresenceTracker::new());
        let activity = Arc::new(ActivityTracker::new());
        let suppression = Arc::new(SuppressionGuard::new());
        let channel = Arc::new(SessionChannel::new(presence.clone()));

        let config = Config::test_defaults();

        let service = ChatService::new(
            store.clone(),
            presence.clone(),
            activity,
            suppression,
            channel,
            push.clone(),
            &config,
        );

        Self {
            service,
            store,
            push,
            presence,
        }
    }

    pub fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.register_user(id);
        id
    }

    /// Open a live session for the user; frames arrive on the returned
    /// receiver as serialized JSON.
    pub async fn connect(&self, user_id: Uuid) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.service.connect(user_id, tx).await;
        rx
    }
}

/// Drain every frame currently queued on a session receiver.
pub fn drain_frames(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str(&raw).expect("frame is valid JSON"));
    }
    frames
}

/// Frames of one event type, e.g. `"message.new"`.
pub fn frames_of_type(frames: &[serde_json::Value], event_type: &str) -> Vec<serde_json::Value> {
    frames
        .iter()
        .filter(|f| f["type"] == event_type)
        .cloned()
        .collect()
}
