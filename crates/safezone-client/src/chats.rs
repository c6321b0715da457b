//! Chat creation and the live chat list.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

use safezone_shared::receipts;
use safezone_shared::{ChatId, ReadStatus, Username};
use safezone_store::{Chat, Watch};

use crate::error::SyncError;
use crate::sync::{ChatSyncController, Decryptor, MessageBody};

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    pub peer: Username,
    /// Decrypted newest message, `None` before the first send.
    pub preview: Option<MessageBody>,
    pub last_sender: Option<Username>,
    /// Receipt of the newest message when the local user sent it.
    pub receipt: Option<ReadStatus>,
    /// The newest message is incoming and not yet acknowledged.
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
}

impl ChatSyncController {
    /// Start (or reopen) the conversation with `other`.
    ///
    /// The id depends only on the pair, so calling this twice, from either
    /// side, yields the same chat.
    pub fn get_or_create_chat(&self, other: &Username) -> Result<ChatId, SyncError> {
        let me = self.identity().username();
        if me == other {
            return Err(SyncError::InvalidParticipants(
                "cannot start a chat with yourself".into(),
            ));
        }

        let (chat_id, created) = self.store.ensure_chat(me, other)?;
        if created {
            tracing::info!(chat = %chat_id, "chat started");
        }
        Ok(chat_id)
    }

    /// Live list of the local user's chats, most recently active first.
    pub fn chat_list(&self) -> ChatList {
        let me = self.identity().username().clone();
        let (watch, failure) = match self.store.watch_chats(&me) {
            Ok(watch) => (Some(watch), None),
            Err(e) => {
                tracing::warn!(user = %me, error = %e, "could not open chat list feed");
                (None, Some(SyncError::FeedSubscriptionFailed(e.to_string())))
            }
        };

        ChatList {
            owes_empty: watch.is_none(),
            watch,
            decryptor: self.decryptor(),
            failure,
        }
    }
}

/// Stream of complete chat lists.  Same failure behaviour as
/// [`ChatSubscription`](crate::sync::ChatSubscription).
pub struct ChatList {
    watch: Option<Watch<Vec<Chat>>>,
    owes_empty: bool,
    decryptor: Arc<Decryptor>,
    failure: Option<SyncError>,
}

impl ChatList {
    pub fn failure(&self) -> Option<&SyncError> {
        self.failure.as_ref()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            watch.cancel();
        }
        self.owes_empty = false;
    }
}

impl Stream for ChatList {
    type Item = Vec<ChatSummary>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let Some(watch) = this.watch.as_mut() else {
            if this.owes_empty {
                this.owes_empty = false;
                return Poll::Ready(Some(Vec::new()));
            }
            return Poll::Ready(None);
        };

        match watch.poll_recv(cx) {
            Poll::Ready(Some(Ok(chats))) => Poll::Ready(Some(
                chats
                    .iter()
                    .filter_map(|chat| summarize(&this.decryptor, chat))
                    .collect(),
            )),
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "chat list snapshot failed");
                Poll::Ready(Some(Vec::new()))
            }
            Poll::Ready(None) => {
                this.watch = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

fn summarize(decryptor: &Decryptor, chat: &Chat) -> Option<ChatSummary> {
    let me = decryptor.me();
    let peer = chat.peer_of(me)?.clone();
    let last = chat.last_message.as_ref();

    let receipt = last
        .filter(|m| m.sender == *me)
        .map(|m| receipts::status(&m.read_by, &m.participants(), me));
    let unread = last.is_some_and(|m| {
        m.sender != *me && !m.read_by.get(me).copied().unwrap_or(false)
    });

    Some(ChatSummary {
        id: chat.id.clone(),
        peer,
        preview: last.map(|m| decryptor.body(m)),
        last_sender: last.map(|m| m.sender.clone()),
        receipt,
        unread,
        updated_at: chat.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;
    use safezone_shared::Identity;
    use safezone_store::{Database, DirectoryEntry, LiveStore};

    fn u(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn controllers(names: &[&str]) -> Vec<ChatSyncController> {
        let store = LiveStore::new(Database::open_in_memory().unwrap());
        names
            .iter()
            .map(|n| {
                let identity = Identity::generate(u(n));
                store
                    .publish_user(&DirectoryEntry {
                        username: identity.username().clone(),
                        public_key: identity.public_key(),
                        created_at: Utc::now(),
                    })
                    .unwrap();
                ChatSyncController::new(store.clone(), identity)
            })
            .collect()
    }

    async fn next(list: &mut ChatList) -> Vec<ChatSummary> {
        tokio::time::timeout(Duration::from_secs(2), list.next())
            .await
            .expect("chat list timed out")
            .expect("chat list ended")
    }

    #[test]
    fn chat_creation_is_idempotent() {
        let c = controllers(&["alice", "bob"]);
        let first = c[0].get_or_create_chat(&u("bob")).unwrap();
        let second = c[1].get_or_create_chat(&u("alice")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "alice_bob");
        assert_eq!(c[0].store.list_chats_for_user(&u("alice")).unwrap().len(), 1);
    }

    #[test]
    fn chat_with_self_rejected() {
        let c = controllers(&["alice"]);
        assert!(matches!(
            c[0].get_or_create_chat(&u("alice")),
            Err(SyncError::InvalidParticipants(_))
        ));
    }

    #[tokio::test]
    async fn list_shows_preview_unread_and_receipt() {
        let c = controllers(&["alice", "bob", "carol"]);
        let (alice, bob, carol) = (&c[0], &c[1], &c[2]);

        let with_bob = alice.get_or_create_chat(&u("bob")).unwrap();
        let with_carol = alice.get_or_create_chat(&u("carol")).unwrap();

        let mut bob_list = bob.chat_list();
        let initial = next(&mut bob_list).await;
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].peer.as_str(), "alice");
        assert!(initial[0].preview.is_none());
        assert!(!initial[0].unread);

        let sent = alice.send_text(&with_bob, "hey bob").unwrap();
        let rows = next(&mut bob_list).await;
        assert_eq!(rows[0].preview, Some(MessageBody::Text("hey bob".into())));
        assert!(rows[0].unread);
        assert_eq!(rows[0].receipt, None);

        bob.mark_read(&with_bob, &sent.id, &u("bob")).unwrap();
        let rows = next(&mut bob_list).await;
        assert!(!rows[0].unread);

        carol.send_text(&with_carol, "hi alice").unwrap();
        let alice_rows: Vec<ChatSummary> = next(&mut alice.chat_list()).await;
        assert_eq!(alice_rows[0].id, with_carol);
        assert_eq!(alice_rows[1].id, with_bob);
        assert_eq!(alice_rows[1].receipt, Some(ReadStatus::FullyRead));
    }
}
