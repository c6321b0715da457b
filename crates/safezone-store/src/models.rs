//! Domain records persisted by the store.
//!
//! Every struct derives `Serialize` and `Deserialize`; `Message` is also
//! embedded (bincode) as the chat-level `last_message` snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use safezone_shared::{ChatId, Ciphertext, PublicKey, Username};

// ---------------------------------------------------------------------------
// DirectoryEntry
// ---------------------------------------------------------------------------

/// A published identity.  Only the public key ever reaches the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub username: Username,
    pub public_key: PublicKey,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One chat message, encrypted independently for every participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned identifier.
    pub id: String,
    pub chat_id: ChatId,
    pub sender: Username,
    /// Exactly one ciphertext per chat participant, sender included.
    pub encrypted_payloads: BTreeMap<Username, Ciphertext>,
    /// Server-assigned, strictly increasing within a chat.
    pub sent_at: DateTime<Utc>,
    /// The only mutable part of a message.
    pub read_by: BTreeMap<Username, bool>,
}

impl Message {
    /// Participants this message was addressed to.
    pub fn participants(&self) -> BTreeSet<Username> {
        self.encrypted_payloads.keys().cloned().collect()
    }
}

/// A message as submitted by a client, before the store assigns id and time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Username,
    pub encrypted_payloads: BTreeMap<Username, Ciphertext>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A two-party conversation summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub participants: BTreeSet<Username>,
    /// Snapshot of the newest message, `None` until the first send.
    pub last_message: Option<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// The other participant, from `me`'s point of view.
    pub fn peer_of(&self, me: &Username) -> Option<&Username> {
        self.participants.iter().find(|u| *u != me)
    }
}
