use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use safezone_shared::receipts::{apply_read, initial_read_by};
use safezone_shared::{ChatId, Ciphertext, Username};

use crate::chats::{load_chat, refresh_last_message, store_last_message};
use crate::codec::{conversion, decode_ts, encode_ts};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender, payloads, read_by, sent_at";

impl Database {
    /// Append a message to a chat and refresh the chat summary in one
    /// transaction.  Either both writes land or neither does.
    ///
    /// The store assigns the id and a `sent_at` that is strictly greater than
    /// every earlier message in the same chat.
    pub fn append_message(&mut self, chat_id: &ChatId, new: &NewMessage) -> Result<Message> {
        let tx = self.conn_mut().transaction()?;

        let chat = load_chat(&tx, chat_id)?.ok_or(StoreError::NotFound)?;

        let addressed: BTreeSet<Username> = new.encrypted_payloads.keys().cloned().collect();
        if addressed != chat.participants {
            return Err(StoreError::Invalid(format!(
                "payloads must cover exactly the participants of {chat_id}"
            )));
        }
        if !chat.participants.contains(&new.sender) {
            return Err(StoreError::Invalid(format!(
                "{} is not a participant of {chat_id}",
                new.sender
            )));
        }

        let sent_at = next_sent_at(&tx, chat_id)?;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.clone(),
            sender: new.sender.clone(),
            encrypted_payloads: new.encrypted_payloads.clone(),
            sent_at,
            read_by: initial_read_by(&chat.participants, &new.sender),
        };

        tx.execute(
            &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                message.id,
                message.chat_id.as_str(),
                message.sender.as_str(),
                bincode::serialize(&message.encrypted_payloads)?,
                serde_json::to_string(&message.read_by)?,
                encode_ts(&message.sent_at),
            ],
        )?;
        store_last_message(&tx, chat_id, &message, sent_at)?;

        tx.commit()?;
        Ok(message)
    }

    pub fn get_message(&self, chat_id: &ChatId, id: &str) -> Result<Option<Message>> {
        Ok(load_message(self.conn(), chat_id, id)?)
    }

    /// Every message of a chat in ascending `sent_at` order.
    pub fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
             ORDER BY sent_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![chat_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Record that `reader` has seen message `id`.
    ///
    /// The read-modify-write of `read_by` runs in a transaction so concurrent
    /// readers never clobber each other's acknowledgment.  Returns whether
    /// the map changed; senders, non-participants and repeat reads are
    /// no-ops.  Fails with [`StoreError::NotFound`] for an unknown message.
    pub fn mark_message_read(
        &mut self,
        chat_id: &ChatId,
        id: &str,
        reader: &Username,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let mut message = load_message(&tx, chat_id, id)?.ok_or(StoreError::NotFound)?;
        let participants = message.participants();

        if !apply_read(&mut message.read_by, &participants, &message.sender, reader) {
            return Ok(false);
        }

        tx.execute(
            "UPDATE messages SET read_by = ?1 WHERE id = ?2",
            params![serde_json::to_string(&message.read_by)?, message.id],
        )?;

        let snapshot_is_this = load_chat(&tx, chat_id)?
            .and_then(|chat| chat.last_message)
            .is_some_and(|last| last.id == message.id);
        if snapshot_is_this {
            refresh_last_message(&tx, chat_id, &message)?;
        }

        tx.commit()?;
        Ok(true)
    }
}

/// Now, truncated to the stored precision, nudged past the newest message.
fn next_sent_at(conn: &Connection, chat_id: &ChatId) -> Result<DateTime<Utc>> {
    let now = Utc::now().trunc_subsecs(6);

    let latest: Option<String> = conn.query_row(
        "SELECT MAX(sent_at) FROM messages WHERE chat_id = ?1",
        params![chat_id.as_str()],
        |row| row.get(0),
    )?;

    match latest {
        Some(raw) => {
            let latest = decode_ts(0, &raw)?;
            if latest >= now {
                Ok(latest + Duration::microseconds(1))
            } else {
                Ok(now)
            }
        }
        None => Ok(now),
    }
}

fn load_message(conn: &Connection, chat_id: &ChatId, id: &str) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_id = ?2"),
        params![id, chat_id.as_str()],
        row_to_message,
    )
    .optional()
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let payloads: Vec<u8> = row.get(3)?;
    let read_by: String = row.get(4)?;
    let sent_str: String = row.get(5)?;

    let sender = Username::parse(&sender).map_err(|e| conversion(2, Type::Text, e))?;
    let encrypted_payloads: BTreeMap<Username, Ciphertext> =
        bincode::deserialize(&payloads).map_err(|e| conversion(3, Type::Blob, e))?;
    let read_by: BTreeMap<Username, bool> =
        serde_json::from_str(&read_by).map_err(|e| conversion(4, Type::Text, e))?;

    Ok(Message {
        id,
        chat_id: ChatId::from_raw(chat_id),
        sender,
        encrypted_payloads,
        sent_at: decode_ts(5, &sent_str)?,
        read_by,
    })
}
