use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Largest media attachment accepted by the composer (50 MiB)
pub const MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "profilePic", default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    Online,
    Offline,
}

/// A message record as confirmed by the server.
///
/// Ids and timestamps are always server-assigned; nothing in the crate
/// builds one of these from local input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "receiverId")]
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message belongs to the conversation with `contact_id`
    pub fn involves(&self, contact_id: &str) -> bool {
        self.sender_id == contact_id || self.receiver_id == contact_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/",
            MediaKind::Video => "video/",
            MediaKind::Audio => "audio/",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Please select a valid {expected} file (got {actual})")]
    WrongType { expected: &'static str, actual: String },

    #[error("Attachment is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Raw bytes of an attachment plus its MIME type. Serialized as a
/// base64 `data:` URL, which is what the server's upload path expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    mime_type: String,
    data: Vec<u8>,
}

impl MediaBlob {
    pub fn new(kind: MediaKind, mime_type: &str, data: Vec<u8>) -> Result<Self, MediaError> {
        if !mime_type.starts_with(kind.mime_prefix()) {
            return Err(MediaError::WrongType {
                expected: kind.mime_prefix(),
                actual: mime_type.to_string(),
            });
        }
        if data.len() > MAX_MEDIA_BYTES {
            return Err(MediaError::TooLarge {
                size: data.len(),
                limit: MAX_MEDIA_BYTES,
            });
        }
        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }
}

impl Serialize for MediaBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

/// What the user typed or attached in the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaBlob>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, blob: MediaBlob) -> Self {
        self.image = Some(blob);
        self
    }

    pub fn with_video(mut self, blob: MediaBlob) -> Self {
        self.video = Some(blob);
        self
    }

    pub fn with_audio(mut self, blob: MediaBlob) -> Self {
        self.audio = Some(blob);
        self
    }

    /// Trims the text and drops it when only whitespace remains
    pub fn normalized(mut self) -> Self {
        self.text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn is_empty(&self) -> bool {
        let has_text = self.text.as_deref().map_or(false, |t| !t.trim().is_empty());
        !has_text && self.image.is_none() && self.video.is_none() && self.audio.is_none()
    }
}
