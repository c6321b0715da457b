//! CRUD operations for [`DirectoryEntry`] records.

use rusqlite::types::Type;
use rusqlite::{params, ErrorCode, OptionalExtension};

use safezone_shared::{PublicKey, Username};

use crate::codec::{conversion, decode_ts, encode_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::DirectoryEntry;

impl Database {
    /// Publish a directory entry.  Fails with [`StoreError::AlreadyExists`]
    /// if the username is taken.
    pub fn insert_user(&self, entry: &DirectoryEntry) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (username, public_key, created_at) VALUES (?1, ?2, ?3)",
                params![
                    entry.username.as_str(),
                    entry.public_key.to_hex(),
                    encode_ts(&entry.created_at),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    StoreError::AlreadyExists(entry.username.to_string())
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    pub fn get_user(&self, username: &Username) -> Result<Option<DirectoryEntry>> {
        let entry = self
            .conn()
            .query_row(
                "SELECT username, public_key, created_at FROM users WHERE username = ?1",
                params![username.as_str()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Every published identity, ordered by username.
    pub fn list_users(&self) -> Result<Vec<DirectoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT username, public_key, created_at FROM users ORDER BY username ASC",
        )?;

        let rows = stmt.query_map([], row_to_entry)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectoryEntry> {
    let username: String = row.get(0)?;
    let key_hex: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    let username = Username::parse(&username).map_err(|e| conversion(0, Type::Text, e))?;
    let public_key = PublicKey::from_hex(&key_hex).map_err(|e| conversion(1, Type::Text, e))?;
    let created_at = decode_ts(2, &created_str)?;

    Ok(DirectoryEntry {
        username,
        public_key,
        created_at,
    })
}
