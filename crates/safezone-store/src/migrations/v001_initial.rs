//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `secure_items`, `users`, `chats` and
//! `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Secure items (device-local key-value pairs, vault file only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS secure_items (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Users (public identity directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username   TEXT PRIMARY KEY NOT NULL,
    public_key TEXT NOT NULL,                -- hex-encoded 32-byte X25519 key
    created_at TEXT NOT NULL                 -- RFC-3339, microsecond precision
);

-- ----------------------------------------------------------------
-- Chats (two-party, id = sorted usernames joined by '_')
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id            TEXT PRIMARY KEY NOT NULL,
    participant_a TEXT NOT NULL,             -- lexicographically smaller
    participant_b TEXT NOT NULL,
    last_message  BLOB,                      -- bincode Message snapshot
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_participant_a ON chats(participant_a, updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_chats_participant_b ON chats(participant_b, updated_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,     -- UUID v4, server-assigned
    chat_id   TEXT NOT NULL,                 -- FK -> chats(id)
    sender    TEXT NOT NULL,
    payloads  BLOB NOT NULL,                 -- bincode map username -> ciphertext
    read_by   TEXT NOT NULL,                 -- JSON map username -> bool
    sent_at   TEXT NOT NULL,                 -- strictly increasing per chat

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_sent
    ON messages(chat_id, sent_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
