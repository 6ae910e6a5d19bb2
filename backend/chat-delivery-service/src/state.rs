use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::registry::{ActivityTracker, PresenceTracker, SuppressionGuard};

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub presence: Arc<PresenceTracker>,
    pub activity: Arc<ActivityTracker>,
    pub suppression: Arc<SuppressionGuard>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Pool<Postgres>, config: Arc<Config>) -> Self {
        Self {
            db,
            presence: Arc::new(PresenceTracker::new()),
            activity: Arc::new(ActivityTracker::new()),
            suppression: Arc::new(SuppressionGuard::new()),
            config,
        }
    }
}
