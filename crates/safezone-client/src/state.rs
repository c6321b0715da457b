//! Application state owned by the UI layer.
//!
//! Holds the vault, the shared store, the loaded identity and at most one
//! focused chat subscription, so that opening a chat always tears down the
//! previous listener first.

use safezone_shared::{EntropySource, Identity, Username};
use safezone_store::{Database, LiveStore};

use crate::config::ClientConfig;
use crate::directory::Directory;
use crate::error::ClientError;
use crate::keys::KeyAgent;
use crate::profile;
use crate::sync::{ChatSubscription, ChatSyncController};

pub struct AppState {
    keys: KeyAgent,
    store: LiveStore,
    directory: Directory,

    /// `None` until a profile is set up or loaded.
    controller: Option<ChatSyncController>,

    /// Subscription for the chat screen currently shown.
    focused: Option<ChatSubscription>,
}

impl AppState {
    /// Open the vault and store named by `config` and load any saved identity.
    pub fn open(config: &ClientConfig) -> Result<Self, ClientError> {
        let keys = KeyAgent::open(&config.vault_path)?;
        let db = Database::open_at(&config.store_path)?;
        Self::with_parts(keys, LiveStore::with_watch_buffer(db, config.feed_buffer))
    }

    /// Build state from already-open parts.  A corrupt vault is an error,
    /// not an empty profile.
    pub fn with_parts(keys: KeyAgent, store: LiveStore) -> Result<Self, ClientError> {
        let controller = keys
            .load_local_identity()?
            .map(|identity| ChatSyncController::new(store.clone(), identity));

        if let Some(c) = &controller {
            tracing::info!(username = %c.identity().username(), "identity loaded");
        }

        Ok(Self {
            keys,
            directory: Directory::new(store.clone()),
            store,
            controller,
            focused: None,
        })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.controller.as_ref().map(|c| c.identity())
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn store(&self) -> &LiveStore {
        &self.store
    }

    pub fn controller(&self) -> Result<&ChatSyncController, ClientError> {
        self.controller.as_ref().ok_or(ClientError::NoIdentity)
    }

    /// Run first-time profile setup and load the new identity.
    pub fn setup_profile<S>(&mut self, username_input: &str, entropy: &mut S) -> Result<&Identity, ClientError>
    where
        S: EntropySource + ?Sized,
    {
        if self.controller.is_some() {
            return Err(ClientError::ProfileExists);
        }

        let identity =
            profile::setup_profile(&mut self.keys, &self.directory, username_input, entropy)?;
        let controller = self
            .controller
            .insert(ChatSyncController::new(self.store.clone(), identity));
        Ok(controller.identity())
    }

    /// Open the chat with `other`, replacing any previously focused chat.
    pub fn focus_chat(&mut self, other: &Username) -> Result<&mut ChatSubscription, ClientError> {
        self.blur_chat();

        let controller = self.controller()?;
        let chat_id = controller.get_or_create_chat(other)?;
        let subscription = controller.subscribe(&chat_id);

        Ok(self.focused.insert(subscription))
    }

    pub fn focused(&mut self) -> Option<&mut ChatSubscription> {
        self.focused.as_mut()
    }

    /// Close the focused chat, if any.
    pub fn blur_chat(&mut self) {
        if let Some(mut previous) = self.focused.take() {
            previous.unsubscribe();
        }
    }

    /// Wipe the local identity.  The published directory entry is kept.
    pub fn reset_profile(&mut self) -> Result<(), ClientError> {
        self.blur_chat();
        profile::reset_profile(&mut self.keys)?;
        self.controller = None;
        tracing::info!("profile reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    fn u(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn photo(seed: u8) -> Vec<u8> {
        (0..512u32).map(|i| (i as u8) ^ seed).collect()
    }

    fn fresh(store: &LiveStore) -> AppState {
        AppState::with_parts(KeyAgent::in_memory().unwrap(), store.clone()).unwrap()
    }

    #[tokio::test]
    async fn focus_replaces_previous_subscription() {
        let store = LiveStore::new(Database::open_in_memory().unwrap());
        let mut bob = fresh(&store);
        bob.setup_profile("bob", &mut photo(2)).unwrap();
        let mut carol = fresh(&store);
        carol.setup_profile("carol", &mut photo(3)).unwrap();

        let mut alice = fresh(&store);
        assert!(matches!(alice.focus_chat(&u("bob")), Err(ClientError::NoIdentity)));
        alice.setup_profile("alice", &mut photo(1)).unwrap();

        let first = alice.focus_chat(&u("bob")).unwrap();
        assert_eq!(first.chat_id().as_str(), "alice_bob");
        let initial = tokio::time::timeout(Duration::from_secs(2), first.next())
            .await
            .unwrap()
            .unwrap();
        assert!(initial.is_empty());

        let second = alice.focus_chat(&u("carol")).unwrap();
        assert_eq!(second.chat_id().as_str(), "alice_carol");
        assert!(second.is_active());

        alice.blur_chat();
        assert!(alice.focused().is_none());
    }

    #[test]
    fn reload_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            store_path: dir.path().join("store.db"),
            vault_path: dir.path().join("vault.db"),
            ..ClientConfig::default()
        };

        let mut state = AppState::open(&config).unwrap();
        assert!(state.identity().is_none());
        let key = state.setup_profile("alice", &mut photo(9)).unwrap().public_key();
        assert!(matches!(
            state.setup_profile("alice2", &mut photo(9)),
            Err(ClientError::ProfileExists)
        ));
        drop(state);

        let mut state = AppState::open(&config).unwrap();
        assert_eq!(state.identity().map(|i| i.public_key()), Some(key));

        state.reset_profile().unwrap();
        assert!(state.identity().is_none());
        assert!(state.directory().lookup(&u("alice")).unwrap().is_some());

        drop(state);
        assert!(AppState::open(&config).unwrap().identity().is_none());
    }
}
