//! CRUD operations for [`Chat`] records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use safezone_shared::{ChatId, Username};

use crate::codec::{conversion, decode_ts, encode_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, Message};

const CHAT_COLUMNS: &str =
    "id, participant_a, participant_b, last_message, created_at, updated_at";

impl Database {
    /// Create the chat between `a` and `b` unless it already exists.
    ///
    /// Returns the chat id and whether a new row was written.  The id is the
    /// same whichever order the participants are given in.
    pub fn insert_chat_if_absent(
        &self,
        a: &Username,
        b: &Username,
        now: DateTime<Utc>,
    ) -> Result<(ChatId, bool)> {
        if a == b {
            return Err(StoreError::Invalid(format!(
                "chat needs two distinct participants, got {a} twice"
            )));
        }

        let id = ChatId::for_pair(a, b);
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let ts = encode_ts(&now);

        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO chats
                 (id, participant_a, participant_b, last_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
            params![id.as_str(), first.as_str(), second.as_str(), ts],
        )?;

        Ok((id, affected > 0))
    }

    pub fn get_chat(&self, id: &ChatId) -> Result<Option<Chat>> {
        Ok(load_chat(self.conn(), id)?)
    }

    /// All chats `user` takes part in, most recently updated first.
    pub fn list_chats_for_user(&self, user: &Username) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY updated_at DESC, id ASC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

/// Load a chat on any connection, including an open transaction.
pub(crate) fn load_chat(conn: &Connection, id: &ChatId) -> rusqlite::Result<Option<Chat>> {
    conn.query_row(
        &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
        params![id.as_str()],
        row_to_chat,
    )
    .optional()
}

/// Replace the chat's `last_message` snapshot and bump `updated_at`.
pub(crate) fn store_last_message(
    conn: &Connection,
    id: &ChatId,
    message: &Message,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let snapshot = bincode::serialize(message)?;
    conn.execute(
        "UPDATE chats SET last_message = ?1, updated_at = ?2 WHERE id = ?3",
        params![snapshot, encode_ts(&updated_at), id.as_str()],
    )?;
    Ok(())
}

/// Replace only the snapshot, leaving `updated_at` alone.
pub(crate) fn refresh_last_message(conn: &Connection, id: &ChatId, message: &Message) -> Result<()> {
    let snapshot = bincode::serialize(message)?;
    conn.execute(
        "UPDATE chats SET last_message = ?1 WHERE id = ?2",
        params![snapshot, id.as_str()],
    )?;
    Ok(())
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id: String = row.get(0)?;
    let a: String = row.get(1)?;
    let b: String = row.get(2)?;
    let last_blob: Option<Vec<u8>> = row.get(3)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let mut participants = BTreeSet::new();
    participants.insert(Username::parse(&a).map_err(|e| conversion(1, Type::Text, e))?);
    participants.insert(Username::parse(&b).map_err(|e| conversion(2, Type::Text, e))?);

    let last_message = match last_blob {
        Some(bytes) => Some(
            bincode::deserialize::<Message>(&bytes).map_err(|e| conversion(3, Type::Blob, e))?,
        ),
        None => None,
    };

    Ok(Chat {
        id: ChatId::from_raw(id),
        participants,
        last_message,
        created_at: decode_ts(4, &created_str)?,
        updated_at: decode_ts(5, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn u(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn create_is_idempotent_and_order_independent() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let (id, created) = db.insert_chat_if_absent(&u("bob"), &u("alice"), now).unwrap();
        assert!(created);
        assert_eq!(id.as_str(), "alice_bob");

        let (again, created) = db.insert_chat_if_absent(&u("alice"), &u("bob"), now).unwrap();
        assert!(!created);
        assert_eq!(again, id);

        let chat = db.get_chat(&id).unwrap().unwrap();
        assert_eq!(chat.participants, BTreeSet::from([u("alice"), u("bob")]));
        assert!(chat.last_message.is_none());
    }

    #[test]
    fn self_chat_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .insert_chat_if_absent(&u("alice"), &u("alice"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn list_newest_first_and_filtered() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();

        db.insert_chat_if_absent(&u("alice"), &u("bob"), t0).unwrap();
        db.insert_chat_if_absent(&u("alice"), &u("carol"), t0 + Duration::seconds(5))
            .unwrap();
        db.insert_chat_if_absent(&u("bob"), &u("carol"), t0).unwrap();

        let ids: Vec<String> = db
            .list_chats_for_user(&u("alice"))
            .unwrap()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, ["alice_carol", "alice_bob"]);
    }

    #[test]
    fn missing_chat_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_chat(&ChatId::from_raw("nobody_here")).unwrap().is_none());
    }
}
