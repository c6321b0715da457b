//! Public identity directory: publishing, contacts and search.

use chrono::Utc;

use safezone_shared::{Identity, PublicKey, Username};
use safezone_store::{DirectoryEntry, LiveStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Username,
    PublicKey,
}

#[derive(Clone)]
pub struct Directory {
    store: LiveStore,
}

impl Directory {
    pub fn new(store: LiveStore) -> Self {
        Self { store }
    }

    /// Publish the identity's public key under its username.
    /// Fails with [`StoreError::AlreadyExists`] if the name is taken.
    pub fn publish(&self, identity: &Identity) -> Result<DirectoryEntry, StoreError> {
        let entry = DirectoryEntry {
            username: identity.username().clone(),
            public_key: identity.public_key(),
            created_at: Utc::now(),
        };
        self.store.publish_user(&entry)?;
        Ok(entry)
    }

    pub fn lookup(&self, username: &Username) -> Result<Option<DirectoryEntry>, StoreError> {
        self.store.get_user(username)
    }

    pub fn public_key_of(&self, username: &Username) -> Result<Option<PublicKey>, StoreError> {
        Ok(self.lookup(username)?.map(|entry| entry.public_key))
    }

    pub fn is_available(&self, username: &Username) -> Result<bool, StoreError> {
        Ok(self.lookup(username)?.is_none())
    }

    /// Everyone except `me`, sorted by username.
    pub fn contacts(&self, me: &Username) -> Result<Vec<DirectoryEntry>, StoreError> {
        let mut users = self.store.list_users()?;
        users.retain(|entry| entry.username != *me);
        Ok(users)
    }

    /// Case-insensitive substring search over the contacts of `me`.
    /// A blank query matches nothing.
    pub fn search(
        &self,
        me: &Username,
        query: &str,
        mode: SearchMode,
    ) -> Result<Vec<DirectoryEntry>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = self.contacts(me)?;
        found.retain(|entry| {
            let haystack = match mode {
                SearchMode::Username => entry.username.as_str().to_lowercase(),
                SearchMode::PublicKey => entry.public_key.to_hex(),
            };
            haystack.contains(&needle)
        });
        Ok(found)
    }
}
