pub mod message;

pub use message::{ChatMessage, ConversationKey, MessagePage};
