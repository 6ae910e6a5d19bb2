use dashmap::DashMap;
use uuid::Uuid;

/// Tracks which conversation each connected user is actively viewing.
///
/// The sole consumer is the delivery router, which uses `is_active` to decide
/// whether a just-created message can be pre-marked read. The signal is a
/// best-effort UX hint; the read-receipt batcher remains the authoritative
/// read marker.
#[derive(Default)]
pub struct ActivityTracker {
    viewing: DashMap<Uuid, Uuid>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, user_id: Uuid, partner_id: Uuid) {
        self.viewing.insert(user_id, partner_id);
    }

    /// No-op unless the recorded partner matches: a stale "leave" arriving
    /// after the user already switched conversations must not clear the new
    /// entry.
    pub fn leave(&self, user_id: Uuid, partner_id: Uuid) {
        self.viewing
            .remove_if(&user_id, |_, current| *current == partner_id);
    }

    pub fn disconnect_all(&self, user_id: Uuid) {
        self.viewing.remove(&user_id);
    }

    pub fn is_active(&self, user_id: Uuid, partner_id: Uuid) -> bool {
        self.viewing
            .get(&user_id)
            .map(|p| *p == partner_id)
            .unwrap_or(false)
    }
}
