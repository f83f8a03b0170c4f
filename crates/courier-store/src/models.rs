//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to an API
//! layer without an intermediate DTO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_shared::types::{ContactId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single direct message between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Who it is addressed to.
    pub receiver_id: UserId,
    /// Current text content (non-empty after trimming).
    pub content: String,
    /// Whether the receiver has acknowledged the message.
    pub is_read: bool,
    /// Whether the content refers to an image.
    pub is_image: bool,
    /// Resolved image URL, present when `is_image` is meaningful.
    pub image_url: Option<String>,
    /// The pre-edit text, captured by the first edit and never overwritten.
    pub original_content: Option<String>,
    /// When the message was last edited. `None` until the first edit.
    pub edited_at: Option<DateTime<Utc>>,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// When any column last changed.
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build a fresh, unread message stamped with the current time.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        is_image: bool,
        image_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            sender_id,
            receiver_id,
            content,
            is_read: false,
            is_image,
            image_url,
            original_content: None,
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A directed contact edge. Inviting a user creates both directions, so each
/// side owns an independent last-message pointer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// Unique contact identifier; doubles as the conversation identifier the
    /// client presents at connect time.
    pub id: ContactId,
    /// The user this edge belongs to.
    pub owner_id: UserId,
    /// The user on the other end.
    pub peer_id: UserId,
    /// Most recent message exchanged between the pair, in either direction.
    pub last_message_id: Option<MessageId>,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// UserStatus
// ---------------------------------------------------------------------------

/// Online/offline presence, one row per user, created lazily on the first
/// status change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
    /// Refreshed on every status write.
    pub last_seen: DateTime<Utc>,
}
