//! CRUD operations for [`Message`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courier_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new message.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, is_image,
                                   image_url, original_content, edited_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content,
                message.is_read,
                message.is_image,
                message.image_url,
                message.original_content,
                message.edited_at.map(|t| t.to_rfc3339()),
                message.created_at.to_rfc3339(),
                message.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Full history between two users, in either direction, oldest first.
    pub fn conversation_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC
             LIMIT ?3 OFFSET ?4"
        ))?;

        let rows = stmt.query_map(
            params![a.to_string(), b.to_string(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Number of unread messages sent by `sender` to `receiver`.
    pub fn unread_count(&self, sender: UserId, receiver: UserId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![sender.to_string(), receiver.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the content of a message, enforcing ownership.
    ///
    /// Only the original sender matches the `WHERE` clause; anyone else gets
    /// [`StoreError::NotFound`], indistinguishable from a missing row.  The
    /// first edit snapshots the pre-edit text into `original_content`; later
    /// edits leave the snapshot untouched (`COALESCE`).
    pub fn edit_message(
        &self,
        id: MessageId,
        sender: UserId,
        new_content: &str,
    ) -> Result<Message> {
        let now = Utc::now();
        let affected = self.conn().execute(
            "UPDATE messages
             SET original_content = COALESCE(original_content, content),
                 content = ?1,
                 edited_at = ?2,
                 updated_at = ?2
             WHERE id = ?3 AND sender_id = ?4",
            params![new_content, now.to_rfc3339(), id.to_string(), sender.to_string()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_message(id)
    }

    /// Flip `is_read` on every unread message from `sender` to `receiver`.
    ///
    /// Returns the number of rows changed.  Messages from other senders are
    /// untouched.
    pub fn mark_messages_read(&self, sender: UserId, receiver: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET is_read = 1, updated_at = ?1
             WHERE sender_id = ?2 AND receiver_id = ?3 AND is_read = 0",
            params![Utc::now().to_rfc3339(), sender.to_string(), receiver.to_string()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, is_image, \
                               image_url, original_content, edited_at, created_at, updated_at";

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let is_read: bool = row.get(4)?;
    let is_image: bool = row.get(5)?;
    let image_url: Option<String> = row.get(6)?;
    let original_content: Option<String> = row.get(7)?;
    let edited_str: Option<String> = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(Message {
        id: MessageId(parse_uuid(&id_str, 0)?),
        sender_id: UserId(parse_uuid(&sender_str, 1)?),
        receiver_id: UserId(parse_uuid(&receiver_str, 2)?),
        content,
        is_read,
        is_image,
        image_url,
        original_content,
        edited_at: edited_str.as_deref().map(|s| parse_timestamp(s, 8)).transpose()?,
        created_at: parse_timestamp(&created_str, 9)?,
        updated_at: parse_timestamp(&updated_str, 10)?,
    })
}

pub(crate) fn parse_uuid(s: &str, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
