use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, UserId};

/// Frames a client may send over the WebSocket.
///
/// Decoded once at the connection boundary; the tag is the `type` field of
/// the JSON object. Anything with an unrecognized tag lands on [`Unknown`]
/// and is dropped without feedback.
///
/// [`Unknown`]: ClientFrame::Unknown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a new message to a contact.
    Message {
        receiver: UserId,
        content: String,
        #[serde(default)]
        is_image: bool,
        #[serde(default)]
        image_url: Option<String>,
    },

    /// Edit a previously sent message.
    Edit {
        message_id: MessageId,
        content: String,
    },

    /// Ephemeral typing indicator, never persisted.
    Typing { receiver: UserId, is_typing: bool },

    /// Acknowledge every unread message from `sender`.
    Read { sender: UserId },

    /// Catch-all for tags this server does not understand.
    #[serde(other)]
    Unknown,
}

/// Events the server pushes to connected sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message in one of the recipient's conversations.
    ChatMessage { message: ChatMessage },

    /// A message the recipient can see was edited.
    MessageEdited { message: EditedMessage },

    /// A contact started or stopped typing.
    Typing { user_id: UserId, is_typing: bool },

    /// A contact read the recipient's messages.
    ReadStatus { reader_id: UserId },

    /// A contact went online or offline.
    UserStatus { user_id: UserId, is_online: bool },

    /// Delivered only to the session whose request failed.
    Error { message: String },
}

/// Full message payload carried by [`ServerEvent::ChatMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub content: String,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub is_image: bool,
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// Payload carried by [`ServerEvent::MessageEdited`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditedMessage {
    pub id: MessageId,
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

impl ClientFrame {
    /// Decode a frame from the raw text of a WebSocket message.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl ServerEvent {
    /// Encode for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
