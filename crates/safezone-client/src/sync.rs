//! ChatSyncController: live decrypted message feeds, sending and read
//! tracking for one local identity.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

use safezone_shared::constants::MAX_MESSAGE_SIZE;
use safezone_shared::crypto::{decrypt_from, seal_for_participants};
use safezone_shared::receipts;
use safezone_shared::{ChatId, CryptoError, Identity, PublicKey, ReadStatus, Username};
use safezone_store::{LiveStore, Message, NewMessage, StoreError, Watch};

use crate::error::{SendFailure, SyncError};

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UndecryptableReason {
    /// The ciphertext failed authentication.
    Tampered,
    /// Truncated ciphertext, bad sender key, or non-text plaintext.
    Malformed,
    /// The sender has no directory entry.
    SenderKeyMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MessageBody {
    Text(String),
    /// The message carries no ciphertext for the local user.
    NotForMe,
    Undecryptable(UndecryptableReason),
}

/// A message as the local user sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub sender: Username,
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
    pub is_own: bool,
    /// Receipt state, for messages the local user sent.
    pub receipt: Option<ReadStatus>,
    pub read_by: BTreeMap<Username, bool>,
}

// ---------------------------------------------------------------------------
// Decryptor
// ---------------------------------------------------------------------------

/// Turns stored messages into views for one identity, caching sender keys.
pub(crate) struct Decryptor {
    identity: Identity,
    store: LiveStore,
    keys: Mutex<HashMap<Username, PublicKey>>,
}

impl Decryptor {
    pub(crate) fn new(identity: Identity, store: LiveStore) -> Self {
        let mut keys = HashMap::new();
        keys.insert(identity.username().clone(), identity.public_key());
        Self {
            identity,
            store,
            keys: Mutex::new(keys),
        }
    }

    pub(crate) fn me(&self) -> &Username {
        self.identity.username()
    }

    fn sender_key(&self, sender: &Username) -> Option<PublicKey> {
        if let Ok(keys) = self.keys.lock() {
            if let Some(key) = keys.get(sender) {
                return Some(*key);
            }
        }

        match self.store.get_user(sender) {
            Ok(Some(entry)) => {
                if let Ok(mut keys) = self.keys.lock() {
                    keys.insert(sender.clone(), entry.public_key);
                }
                Some(entry.public_key)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "sender key lookup failed");
                None
            }
        }
    }

    pub(crate) fn body(&self, message: &Message) -> MessageBody {
        let Some(ciphertext) = message.encrypted_payloads.get(self.me()) else {
            return MessageBody::NotForMe;
        };
        let Some(sender_key) = self.sender_key(&message.sender) else {
            return MessageBody::Undecryptable(UndecryptableReason::SenderKeyMissing);
        };

        match decrypt_from(&self.identity, &sender_key, ciphertext) {
            Ok(text) => MessageBody::Text(text),
            Err(CryptoError::TamperedCiphertext) => {
                tracing::warn!(id = %message.id, sender = %message.sender, "message failed authentication");
                MessageBody::Undecryptable(UndecryptableReason::Tampered)
            }
            Err(e) => {
                tracing::debug!(id = %message.id, error = %e, "message undecryptable");
                MessageBody::Undecryptable(UndecryptableReason::Malformed)
            }
        }
    }

    pub(crate) fn view(&self, message: &Message) -> MessageView {
        let is_own = message.sender == *self.me();
        let receipt = is_own
            .then(|| receipts::status(&message.read_by, &message.participants(), self.me()));

        MessageView {
            id: message.id.clone(),
            sender: message.sender.clone(),
            body: self.body(message),
            sent_at: message.sent_at,
            is_own,
            receipt,
            read_by: message.read_by.clone(),
        }
    }

    /// Full, sorted view list from one snapshot, whatever order it arrived in.
    pub(crate) fn views(&self, mut messages: Vec<Message>) -> Vec<MessageView> {
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        messages.iter().map(|m| self.view(m)).collect()
    }
}

// ---------------------------------------------------------------------------
// ChatSubscription
// ---------------------------------------------------------------------------

enum Feed {
    Open(Watch<Vec<Message>>),
    /// The watch never opened; one empty list is still owed.
    Failed { owes_empty: bool },
    Closed,
}

/// Live, decrypted view of one chat.
///
/// Each item is the complete message list.  Dropping the handle stops the
/// underlying watch.
pub struct ChatSubscription {
    chat_id: ChatId,
    feed: Feed,
    decryptor: Arc<Decryptor>,
    failure: Option<SyncError>,
}

impl ChatSubscription {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Why the feed could not be opened, if it could not.
    pub fn failure(&self) -> Option<&SyncError> {
        self.failure.as_ref()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.feed, Feed::Open(_))
    }

    /// Stop receiving updates.  Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Feed::Open(watch) = &mut self.feed {
            watch.cancel();
            tracing::debug!(chat = %self.chat_id, "unsubscribed");
        }
        self.feed = Feed::Closed;
    }
}

impl Stream for ChatSubscription {
    type Item = Vec<MessageView>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match &mut this.feed {
            Feed::Open(watch) => match watch.poll_recv(cx) {
                Poll::Ready(Some(Ok(messages))) => {
                    tracing::debug!(chat = %this.chat_id, count = messages.len(), "feed snapshot");
                    Poll::Ready(Some(this.decryptor.views(messages)))
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(chat = %this.chat_id, error = %e, "feed snapshot failed");
                    Poll::Ready(Some(Vec::new()))
                }
                Poll::Ready(None) => {
                    this.feed = Feed::Closed;
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
            Feed::Failed { owes_empty } => {
                if *owes_empty {
                    *owes_empty = false;
                    Poll::Ready(Some(Vec::new()))
                } else {
                    this.feed = Feed::Closed;
                    Poll::Ready(None)
                }
            }
            Feed::Closed => Poll::Ready(None),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatSyncController
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ChatSyncController {
    pub(crate) store: LiveStore,
    decryptor: Arc<Decryptor>,
}

impl ChatSyncController {
    pub fn new(store: LiveStore, identity: Identity) -> Self {
        let decryptor = Arc::new(Decryptor::new(identity, store.clone()));
        Self { store, decryptor }
    }

    pub fn identity(&self) -> &Identity {
        &self.decryptor.identity
    }

    pub(crate) fn decryptor(&self) -> Arc<Decryptor> {
        Arc::clone(&self.decryptor)
    }

    /// Open a live feed for `chat_id`.
    ///
    /// Never fails outright: if the feed cannot be opened the subscription
    /// yields one empty list, ends, and reports the cause via
    /// [`ChatSubscription::failure`].
    pub fn subscribe(&self, chat_id: &ChatId) -> ChatSubscription {
        let (feed, failure) = match self.store.watch_messages(chat_id) {
            Ok(watch) => {
                tracing::info!(chat = %chat_id, "subscribed");
                (Feed::Open(watch), None)
            }
            Err(e) => {
                tracing::warn!(chat = %chat_id, error = %e, "could not open message feed");
                (
                    Feed::Failed { owes_empty: true },
                    Some(SyncError::FeedSubscriptionFailed(e.to_string())),
                )
            }
        };

        ChatSubscription {
            chat_id: chat_id.clone(),
            feed,
            decryptor: self.decryptor(),
            failure,
        }
    }

    /// Encrypt `plaintext` for every participant and append it to the chat.
    ///
    /// `participant_keys` must hold a key for every other participant.  On
    /// failure nothing is written and the original draft is handed back.
    pub fn send(
        &self,
        chat_id: &ChatId,
        plaintext: &str,
        participant_keys: &BTreeMap<Username, PublicKey>,
    ) -> Result<Message, SendFailure> {
        self.try_send(chat_id, plaintext, participant_keys)
            .map_err(|error| {
                tracing::warn!(chat = %chat_id, error = %error, "send failed");
                SendFailure {
                    draft: plaintext.to_string(),
                    error,
                }
            })
    }

    /// [`send`](Self::send), with participant keys looked up in the directory.
    pub fn send_text(&self, chat_id: &ChatId, plaintext: &str) -> Result<Message, SendFailure> {
        let keys = self.participant_keys(chat_id).map_err(|error| SendFailure {
            draft: plaintext.to_string(),
            error,
        })?;
        self.send(chat_id, plaintext, &keys)
    }

    fn participant_keys(&self, chat_id: &ChatId) -> Result<BTreeMap<Username, PublicKey>, SyncError> {
        let chat = self
            .store
            .get_chat(chat_id)?
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.clone()))?;

        let mut keys = BTreeMap::new();
        for participant in &chat.participants {
            if let Some(entry) = self.store.get_user(participant)? {
                keys.insert(participant.clone(), entry.public_key);
            }
        }
        Ok(keys)
    }

    fn try_send(
        &self,
        chat_id: &ChatId,
        plaintext: &str,
        participant_keys: &BTreeMap<Username, PublicKey>,
    ) -> Result<Message, SyncError> {
        let text = plaintext.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(SyncError::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let identity = self.identity();
        let me = identity.username();

        let chat = self
            .store
            .get_chat(chat_id)?
            .ok_or_else(|| SyncError::ChatNotFound(chat_id.clone()))?;
        if !chat.participants.contains(me) {
            return Err(SyncError::NotAParticipant(me.clone()));
        }

        let mut keys = BTreeMap::new();
        for participant in &chat.participants {
            let key = if participant == me {
                identity.public_key()
            } else {
                *participant_keys
                    .get(participant)
                    .ok_or_else(|| SyncError::RecipientKeyMissing(participant.clone()))?
            };
            keys.insert(participant.clone(), key);
        }

        let encrypted_payloads = seal_for_participants(identity, &keys, text)?;
        let message = self
            .store
            .append_message(
                chat_id,
                &NewMessage {
                    sender: me.clone(),
                    encrypted_payloads,
                },
            )
            .map_err(|e| SyncError::AtomicWriteFailed(e.to_string()))?;

        tracing::info!(chat = %chat_id, id = %message.id, "message sent");
        Ok(message)
    }

    /// Acknowledge message `message_id` on behalf of `username`.
    ///
    /// Returns whether anything changed.  Unknown messages are logged and
    /// treated as a no-op.
    pub fn mark_read(
        &self,
        chat_id: &ChatId,
        message_id: &str,
        username: &Username,
    ) -> Result<bool, SyncError> {
        match self.store.mark_read(chat_id, message_id, username) {
            Ok(changed) => Ok(changed),
            Err(StoreError::NotFound) => {
                tracing::warn!(chat = %chat_id, id = message_id, "mark_read on unknown message");
                Ok(false)
            }
            Err(e) => Err(SyncError::AtomicWriteFailed(e.to_string())),
        }
    }

    /// Acknowledge every incoming message in the chat for the local user.
    /// Returns how many were newly marked.
    pub fn mark_all_read(&self, chat_id: &ChatId) -> Result<usize, SyncError> {
        let me = self.identity().username();
        let mut marked = 0;

        for message in self.store.list_messages(chat_id)? {
            let unread = message.sender != *me && !message.read_by.get(me).copied().unwrap_or(false);
            if unread && self.mark_read(chat_id, &message.id, me)? {
                marked += 1;
            }
        }

        if marked > 0 {
            tracing::debug!(chat = %chat_id, marked, "marked chat read");
        }
        Ok(marked)
    }
}
