// Re-export needed modules for the binary and integration tests
pub mod api;
pub mod config;
pub mod models;
pub mod presence;
pub mod socket;
pub mod store;

// Re-export main types for convenience
pub use api::{ApiError, ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use models::*;
pub use presence::Presence;
pub use socket::{MemoryChannel, PushChannel, PushEvent, WsPushChannel};
pub use store::{ChatError, ChatSnapshot, ChatStore, HistoryLoad, Notice, Operation};
