use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ApiError, ChatApi};
use crate::config::ClientConfig;
use crate::models::{Contact, Message, MessagePayload};

/// Error body the server attaches to 4xx/5xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// `ChatApi` over HTTP with JSON bodies
pub struct HttpChatApi {
    http: Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(&config.server_url).map_err(|e| ApiError::Config(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "server URL cannot be used as a base: {}",
                config.server_url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token() {
            let cookie = HeaderValue::from_str(&format!("jwt={}", token))
                .map_err(|e| ApiError::Config(format!("invalid session token: {}", e)))?;
            headers.insert(COOKIE, cookie);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Config("server URL cannot be used as a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Pass successful responses through; turn anything else into a status
    /// error carrying the server's `message` text.
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => fallback,
        };
        warn!("Chat API returned {}: {}", status.as_u16(), message);
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        Self::check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        let url = self.endpoint(&["api", "messages", "users"])?;
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let contacts: Vec<Contact> = Self::read_json(response).await?;
        info!("Fetched {} contacts", contacts.len());
        Ok(contacts)
    }

    async fn fetch_history(&self, contact_id: &str) -> Result<Vec<Message>, ApiError> {
        let url = self.endpoint(&["api", "messages", contact_id])?;
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let messages: Vec<Message> = Self::read_json(response).await?;
        info!("Fetched {} messages with {}", messages.len(), contact_id);
        Ok(messages)
    }

    async fn send_message(
        &self,
        contact_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError> {
        let url = self.endpoint(&["api", "messages", "send", contact_id])?;
        debug!("POST {}", url);
        let response = self.http.post(url).json(payload).send().await?;
        let message: Message = Self::read_json(response).await?;
        info!("Message {} accepted by server", message.id);
        Ok(message)
    }

    async fn delete_conversation(&self, contact_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "chats", contact_id])?;
        debug!("DELETE {}", url);
        let response = self.http.delete(url).send().await?;
        // body is just a confirmation string, and may be empty
        Self::check_status(response).await?;
        info!("Conversation with {} deleted", contact_id);
        Ok(())
    }
}
