//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `messages`, `contacts`, and `user_status`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    sender_id        TEXT NOT NULL,               -- UUID of the sender
    receiver_id      TEXT NOT NULL,               -- UUID of the receiver
    content          TEXT NOT NULL,
    is_read          INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    is_image         INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    image_url        TEXT,                        -- resolved URL, nullable
    original_content TEXT,                        -- pre-edit text, set once
    edited_at        TEXT,                        -- ISO-8601, null until edited
    created_at       TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at       TEXT NOT NULL
);

-- read-marking scans: unread messages from one sender to one receiver
CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(receiver_id, sender_id, is_read);

-- conversation history, ordered
CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

-- ----------------------------------------------------------------
-- Contacts (directed edges, created in pairs)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id              TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    owner_id        TEXT NOT NULL,                -- UUID of the owning user
    peer_id         TEXT NOT NULL,                -- UUID of the counterpart
    last_message_id TEXT,                         -- nullable FK -> messages(id)
    created_at      TEXT NOT NULL,

    FOREIGN KEY (last_message_id) REFERENCES messages(id) ON DELETE SET NULL,
    UNIQUE (owner_id, peer_id)
);

CREATE INDEX IF NOT EXISTS idx_contacts_peer ON contacts(peer_id);

-- ----------------------------------------------------------------
-- User status (presence)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_status (
    user_id   TEXT PRIMARY KEY NOT NULL,          -- UUID of the user
    is_online INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1
    last_seen TEXT NOT NULL                       -- ISO-8601
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
