//! Process-wide ephemeral registries: who is connected, which conversation
//! each user is viewing, and which conversations already got a push.
//!
//! All state here is lost on restart; every user then starts offline,
//! inactive and unsuppressed, which is the safe default. For a multi-instance
//! deployment these registries would move behind the same interfaces into a
//! shared store.

pub mod activity;
pub mod presence;
pub mod suppression;

pub use activity::ActivityTracker;
pub use presence::{PresenceTracker, SessionSender};
pub use suppression::SuppressionGuard;
