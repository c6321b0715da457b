//! Shared, observable handle over the document store.
//!
//! [`LiveStore`] serialises every write through one connection and announces
//! each committed change on a broadcast channel.  Watches turn those
//! announcements into a stream of fresh, complete snapshots.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use safezone_shared::{ChatId, Username};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, DirectoryEntry, Message, NewMessage};

/// Capacity of the change broadcast.  Slow watchers that fall further behind
/// re-query instead of replaying.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Default number of undelivered snapshots buffered per watch.
pub const DEFAULT_WATCH_BUFFER: usize = 32;

/// A committed write, as announced to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A directory entry was published.
    Directory,
    /// A chat summary was created or updated.
    Chat {
        chat_id: ChatId,
        participants: BTreeSet<Username>,
    },
    /// A message in the chat was added or its receipts changed.
    Messages { chat_id: ChatId },
}

#[derive(Clone)]
pub struct LiveStore {
    db: Arc<Mutex<Database>>,
    changes: broadcast::Sender<StoreChange>,
    watch_buffer: usize,
}

impl LiveStore {
    pub fn new(db: Database) -> Self {
        Self::with_watch_buffer(db, DEFAULT_WATCH_BUFFER)
    }

    pub fn with_watch_buffer(db: Database, watch_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            changes,
            watch_buffer: watch_buffer.max(1),
        }
    }

    /// Run `f` with exclusive access to the underlying database.
    pub fn with_db<R>(&self, f: impl FnOnce(&mut Database) -> Result<R>) -> Result<R> {
        let mut db = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut db)
    }

    /// Subscribe to raw change announcements.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // Err only means nobody is subscribed.
        let _ = self.changes.send(change);
    }

    // -- directory ----------------------------------------------------------

    pub fn publish_user(&self, entry: &DirectoryEntry) -> Result<()> {
        self.with_db(|db| db.insert_user(entry))?;
        tracing::info!(username = %entry.username, key = %entry.public_key.short(), "identity published");
        self.notify(StoreChange::Directory);
        Ok(())
    }

    pub fn get_user(&self, username: &Username) -> Result<Option<DirectoryEntry>> {
        self.with_db(|db| db.get_user(username))
    }

    pub fn list_users(&self) -> Result<Vec<DirectoryEntry>> {
        self.with_db(|db| db.list_users())
    }

    // -- chats --------------------------------------------------------------

    /// Get or create the chat between `a` and `b`.  Returns whether it was
    /// created by this call.
    pub fn ensure_chat(&self, a: &Username, b: &Username) -> Result<(ChatId, bool)> {
        let (chat_id, created) = self.with_db(|db| db.insert_chat_if_absent(a, b, Utc::now()))?;
        if created {
            tracing::debug!(chat = %chat_id, "chat created");
            self.notify(StoreChange::Chat {
                chat_id: chat_id.clone(),
                participants: BTreeSet::from([a.clone(), b.clone()]),
            });
        }
        Ok((chat_id, created))
    }

    pub fn get_chat(&self, chat_id: &ChatId) -> Result<Option<Chat>> {
        self.with_db(|db| db.get_chat(chat_id))
    }

    pub fn list_chats_for_user(&self, user: &Username) -> Result<Vec<Chat>> {
        self.with_db(|db| db.list_chats_for_user(user))
    }

    // -- messages -----------------------------------------------------------

    pub fn get_message(&self, chat_id: &ChatId, id: &str) -> Result<Option<Message>> {
        self.with_db(|db| db.get_message(chat_id, id))
    }

    pub fn list_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        self.with_db(|db| db.list_messages(chat_id))
    }

    pub fn append_message(&self, chat_id: &ChatId, new: &NewMessage) -> Result<Message> {
        let message = self.with_db(|db| db.append_message(chat_id, new))?;
        tracing::debug!(chat = %chat_id, id = %message.id, "message appended");

        self.notify(StoreChange::Messages {
            chat_id: chat_id.clone(),
        });
        self.notify(StoreChange::Chat {
            chat_id: chat_id.clone(),
            participants: message.participants(),
        });
        Ok(message)
    }

    pub fn mark_read(&self, chat_id: &ChatId, id: &str, reader: &Username) -> Result<bool> {
        let participants = self.with_db(|db| {
            if !db.mark_message_read(chat_id, id, reader)? {
                return Ok(None);
            }
            Ok(db.get_chat(chat_id)?.map(|chat| chat.participants))
        })?;

        let Some(participants) = participants else {
            return Ok(false);
        };

        self.notify(StoreChange::Messages {
            chat_id: chat_id.clone(),
        });
        self.notify(StoreChange::Chat {
            chat_id: chat_id.clone(),
            participants,
        });
        Ok(true)
    }

    // -- watches ------------------------------------------------------------

    /// Watch every message of a chat, oldest first.
    ///
    /// The first item is the current state; each later item is a complete
    /// re-read taken after a relevant commit.
    pub fn watch_messages(&self, chat_id: &ChatId) -> Result<Watch<Vec<Message>>> {
        let id = chat_id.clone();
        let filter = chat_id.clone();
        self.spawn_watch(
            move |store| store.list_messages(&id),
            move |change| matches!(change, StoreChange::Messages { chat_id } if *chat_id == filter),
        )
    }

    /// Watch the chat summaries `user` takes part in, newest first.
    pub fn watch_chats(&self, user: &Username) -> Result<Watch<Vec<Chat>>> {
        let me = user.clone();
        let filter = user.clone();
        self.spawn_watch(
            move |store| store.list_chats_for_user(&me),
            move |change| {
                matches!(change, StoreChange::Chat { participants, .. } if participants.contains(&filter))
            },
        )
    }

    fn spawn_watch<T, Q, F>(&self, query: Q, relevant: F) -> Result<Watch<T>>
    where
        T: Send + 'static,
        Q: Fn(&LiveStore) -> Result<T> + Send + 'static,
        F: Fn(&StoreChange) -> bool + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        // Subscribe before the first read so no commit can slip between them.
        let mut changes = self.changes.subscribe();
        let initial = query(self)?;

        let (tx, rx) = mpsc::channel(self.watch_buffer);
        let store = self.clone();

        let task = handle.spawn(async move {
            if tx.send(Ok(initial)).await.is_err() {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(change) if !relevant(&change) => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "watch lagged behind, re-reading");
                    }
                    Err(RecvError::Closed) => break,
                }

                let snapshot = query(&store);
                if let Err(ref e) = snapshot {
                    tracing::warn!(error = %e, "watch snapshot failed");
                }
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Ok(Watch { rx, task })
    }
}

/// A live query.  Dropping it stops the background task.
pub struct Watch<T> {
    rx: mpsc::Receiver<Result<T>>,
    task: JoinHandle<()>,
}

impl<T> Watch<T> {
    /// Next snapshot, or `None` once the watch is cancelled.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        self.rx.poll_recv(cx)
    }

    /// Stop watching.  Snapshots already buffered are discarded.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
