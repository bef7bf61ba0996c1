// REST client for the chat service
// Request/response calls for contacts, history, sending and deleting chats.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Contact, Message, MessagePayload};

pub mod http;

pub use http::HttpChatApi;

/// Errors returned by a chat API implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced an HTTP response
    #[error("Request failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    /// The human-readable part, without the error category prefix
    pub fn reason(&self) -> &str {
        match self {
            ApiError::Transport(reason)
            | ApiError::Decode(reason)
            | ApiError::Config(reason) => reason,
            ApiError::Status { message, .. } => message,
        }
    }
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Every user the current user can chat with, in server order
    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError>;

    /// Messages exchanged with `contact_id`, oldest first
    async fn fetch_history(&self, contact_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Submit a message; the returned record carries the server-assigned id and timestamp
    async fn send_message(
        &self,
        contact_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError>;

    async fn delete_conversation(&self, contact_id: &str) -> Result<(), ApiError>;
}
