//! CRUD operations for [`Contact`] records.

use chrono::Utc;
use rusqlite::params;

use courier_shared::types::{ContactId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{parse_timestamp, parse_uuid};
use crate::models::Contact;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create both directions of a contact relationship in one transaction.
    ///
    /// Returns `(owner -> peer, peer -> owner)`.  The `UNIQUE (owner_id,
    /// peer_id)` constraint rejects a second invitation between the same
    /// pair, rolling back both inserts.
    pub fn create_contact_pair(&mut self, owner: UserId, peer: UserId) -> Result<(Contact, Contact)> {
        let now = Utc::now();
        let forward = Contact {
            id: ContactId::new(),
            owner_id: owner,
            peer_id: peer,
            last_message_id: None,
            created_at: now,
        };
        let reverse = Contact {
            id: ContactId::new(),
            owner_id: peer,
            peer_id: owner,
            last_message_id: None,
            created_at: now,
        };

        let tx = self.conn_mut().transaction()?;
        for contact in [&forward, &reverse] {
            tx.execute(
                "INSERT INTO contacts (id, owner_id, peer_id, last_message_id, created_at)
                 VALUES (?1, ?2, ?3, NULL, ?4)",
                params![
                    contact.id.to_string(),
                    contact.owner_id.to_string(),
                    contact.peer_id.to_string(),
                    contact.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        Ok((forward, reverse))
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single contact edge by id.
    pub fn get_contact(&self, id: ContactId) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT id, owner_id, peer_id, last_message_id, created_at
                 FROM contacts
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All contact edges owned by a user, newest first.
    pub fn contacts_for_user(&self, owner: UserId) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner_id, peer_id, last_message_id, created_at
             FROM contacts
             WHERE owner_id = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![owner.to_string()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Reverse lookup: every user who holds `user` in their contact list.
    ///
    /// These are the users whose sessions care about `user`'s presence.
    pub fn watchers_of(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT owner_id FROM contacts WHERE peer_id = ?1")?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let owner_str: String = row.get(0)?;
            Ok(UserId(parse_uuid(&owner_str, 0)?))
        })?;

        let mut owners = Vec::new();
        for row in rows {
            owners.push(row?);
        }
        Ok(owners)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Point both edges between a sender/receiver pair at a new message.
    ///
    /// At most two rows match (one per direction); a missing direction is
    /// simply not updated.  Returns the number of rows changed.
    pub fn update_last_message(
        &self,
        sender: UserId,
        receiver: UserId,
        message: MessageId,
    ) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE contacts
             SET last_message_id = ?1
             WHERE (owner_id = ?2 AND peer_id = ?3)
                OR (owner_id = ?3 AND peer_id = ?2)",
            params![message.to_string(), sender.to_string(), receiver.to_string()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Contact`].
fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let id_str: String = row.get(0)?;
    let owner_str: String = row.get(1)?;
    let peer_str: String = row.get(2)?;
    let last_message_str: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(Contact {
        id: ContactId(parse_uuid(&id_str, 0)?),
        owner_id: UserId(parse_uuid(&owner_str, 1)?),
        peer_id: UserId(parse_uuid(&peer_str, 2)?),
        last_message_id: last_message_str
            .as_deref()
            .map(|s| parse_uuid(s, 3).map(MessageId))
            .transpose()?,
        created_at: parse_timestamp(&created_str, 4)?,
    })
}
