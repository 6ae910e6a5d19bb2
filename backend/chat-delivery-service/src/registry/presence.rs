use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Handle to a user's live session; frames are serialized JSON payloads.
/// The socket task on the other end owns the actual transport write half.
pub type SessionSender = UnboundedSender<String>;

/// Registry of users currently holding a live connection.
///
/// Single active session per user: a second connection from the same user
/// overwrites the tracked entry. All operations are non-blocking and safe
/// under concurrent access.
#[derive(Default)]
pub struct PresenceTracker {
    sessions: DashMap<Uuid, SessionSender>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_online(&self, user_id: Uuid, session: SessionSender) {
        self.sessions.insert(user_id, session);
    }

    pub fn mark_offline(&self, user_id: Uuid) {
        self.sessions.remove(&user_id);
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    /// Clone of the live session handle, if the user is connected.
    pub fn session(&self, user_id: Uuid) -> Option<SessionSender> {
        self.sessions.get(&user_id).map(|s| s.clone())
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }
}
