use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// No-prior-activity window after which an offline message starts a new
    /// notifiable episode.
    pub quiet_period: Duration,
    /// Upper bound on a single push-notification provider call.
    pub push_timeout: Duration,
    pub fcm: Option<FcmConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;

        let quiet_period_secs: u64 = env::var("QUIET_PERIOD_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let push_timeout_ms: u64 = env::var("PUSH_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let fcm = match env::var("FCM_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => Some(FcmConfig {
                api_key: api_key.trim().to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            quiet_period: Duration::from_secs(quiet_period_secs),
            push_timeout: Duration::from_millis(push_timeout_ms),
            fcm,
        })
    }

    /// Fixed values for test harnesses that never read the environment or
    /// open the database connection.
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            quiet_period: Duration::from_secs(300),
            push_timeout: Duration::from_millis(3000),
            fcm: None,
        }
    }
}
