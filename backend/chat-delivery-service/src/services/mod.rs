pub mod chat;
pub mod delivery;
pub mod message_store;
pub mod push;
pub mod read_receipts;
