pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod migrations;
pub mod models;
pub mod registry;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use services::chat::ChatService;
