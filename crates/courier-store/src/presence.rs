//! CRUD operations for [`UserStatus`] records.

use chrono::Utc;
use rusqlite::params;

use courier_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{parse_timestamp, parse_uuid};
use crate::models::UserStatus;

impl Database {
    /// Set a user's online flag, creating the row on first write.
    ///
    /// `last_seen` is refreshed on every call, so an offline flip records
    /// when the user was last connected.
    pub fn upsert_user_status(&self, user: UserId, is_online: bool) -> Result<UserStatus> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO user_status (user_id, is_online, last_seen)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 is_online = excluded.is_online,
                 last_seen = excluded.last_seen",
            params![user.to_string(), is_online, now.to_rfc3339()],
        )?;

        Ok(UserStatus { user_id: user, is_online, last_seen: now })
    }

    /// Fetch the status row for a user.
    pub fn get_user_status(&self, user: UserId) -> Result<UserStatus> {
        self.conn()
            .query_row(
                "SELECT user_id, is_online, last_seen FROM user_status WHERE user_id = ?1",
                params![user.to_string()],
                row_to_status,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

/// Map a `rusqlite::Row` to a [`UserStatus`].
fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserStatus> {
    let user_str: String = row.get(0)?;
    let is_online: bool = row.get(1)?;
    let last_seen_str: String = row.get(2)?;

    Ok(UserStatus {
        user_id: UserId(parse_uuid(&user_str, 0)?),
        is_online,
        last_seen: parse_timestamp(&last_seen_str, 2)?,
    })
}
