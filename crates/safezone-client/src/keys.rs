//! KeyAgent: derives the local identity and keeps it in the device vault.

use std::path::Path;

use zeroize::Zeroizing;

use safezone_shared::constants::{
    SECRET_KEY_SIZE, SECURE_KEY_PRIVATE_KEY, SECURE_KEY_PUBLIC_KEY, SECURE_KEY_USERNAME,
};
use safezone_shared::{EntropySource, Identity, IdentityError, PublicKey, Username};
use safezone_store::{Database, StoreError};

const VAULT_KEYS: [&str; 3] = [
    SECURE_KEY_PRIVATE_KEY,
    SECURE_KEY_PUBLIC_KEY,
    SECURE_KEY_USERNAME,
];

pub struct KeyAgent {
    vault: Database,
}

impl KeyAgent {
    /// Open the vault file, restricting it to the current user.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            vault: Database::open_private_at(path)?,
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            vault: Database::open_in_memory()?,
        })
    }

    /// Derive a key pair from one entropy sample.  Nothing is stored.
    pub fn derive_key_pair<S>(
        &self,
        source: &mut S,
        username: &Username,
    ) -> Result<Identity, IdentityError>
    where
        S: EntropySource + ?Sized,
    {
        let identity = Identity::derive(source, username)?;
        tracing::info!(username = %username, key = %identity.public_key().short(), "key pair derived");
        Ok(identity)
    }

    /// Write the identity to the vault, replacing any previous one.
    pub fn persist(&mut self, identity: &Identity) -> Result<(), StoreError> {
        let secret = identity.secret_bytes();
        let secret_hex = Zeroizing::new(hex::encode(&secret[..]));
        let public_hex = identity.public_key().to_hex();

        self.vault.set_items(&[
            (SECURE_KEY_PRIVATE_KEY, secret_hex.as_str()),
            (SECURE_KEY_PUBLIC_KEY, public_hex.as_str()),
            (SECURE_KEY_USERNAME, identity.username().as_str()),
        ])?;

        tracing::debug!(username = %identity.username(), "identity persisted");
        Ok(())
    }

    /// Load the stored identity.
    ///
    /// `Ok(None)` when nothing was ever stored.  A partial entry, bad
    /// encoding, or a public key that does not belong to the private key is
    /// reported as [`IdentityError::KeyFile`].
    pub fn load_local_identity(&self) -> Result<Option<Identity>, IdentityError> {
        let private = self.read(SECURE_KEY_PRIVATE_KEY)?.map(Zeroizing::new);
        let public = self.read(SECURE_KEY_PUBLIC_KEY)?;
        let username = self.read(SECURE_KEY_USERNAME)?;

        let (private, public, username) = match (private, public, username) {
            (None, None, None) => return Ok(None),
            (Some(private), Some(public), Some(username)) => (private, public, username),
            _ => return Err(IdentityError::KeyFile("incomplete identity in vault".into())),
        };

        let username = Username::parse(&username)
            .map_err(|e| IdentityError::KeyFile(format!("stored username: {e}")))?;

        let secret = Zeroizing::new(
            hex::decode(private.trim())
                .map_err(|_| IdentityError::KeyFile("private key is not hex".into()))?,
        );
        let secret: Zeroizing<[u8; SECRET_KEY_SIZE]> = Zeroizing::new(
            secret
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::KeyFile("private key has wrong length".into()))?,
        );

        let stored_public = PublicKey::from_hex(&public)
            .map_err(|_| IdentityError::KeyFile("public key is not valid".into()))?;

        let identity = Identity::from_secret_bytes(username, &secret)
            .map_err(|e| IdentityError::KeyFile(e.to_string()))?;

        if identity.public_key() != stored_public {
            return Err(IdentityError::KeyFile(
                "public key does not match private key".into(),
            ));
        }

        Ok(Some(identity))
    }

    pub fn has_stored_identity(&self) -> Result<bool, StoreError> {
        for key in VAULT_KEYS {
            if self.vault.get_item(key)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the stored identity.  Either every key goes or none does.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        self.vault.remove_items(&VAULT_KEYS)?;
        tracing::info!("local identity wiped");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, IdentityError> {
        self.vault
            .get_item(key)
            .map_err(|e| IdentityError::KeyFile(format!("vault unreadable: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn sample(seed: u8) -> Vec<u8> {
        (0..256).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn persist_then_load() {
        let mut agent = KeyAgent::in_memory().unwrap();
        assert!(agent.load_local_identity().unwrap().is_none());
        assert!(!agent.has_stored_identity().unwrap());

        let identity = agent.derive_key_pair(&mut sample(1), &u("alice")).unwrap();
        agent.persist(&identity).unwrap();

        let loaded = agent.load_local_identity().unwrap().unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
        assert_eq!(loaded.username(), identity.username());
        assert!(agent.has_stored_identity().unwrap());
    }

    #[test]
    fn persist_replaces_previous_identity() {
        let mut agent = KeyAgent::in_memory().unwrap();
        let first = Identity::generate(u("alice"));
        let second = Identity::generate(u("bob"));

        agent.persist(&first).unwrap();
        agent.persist(&second).unwrap();

        let loaded = agent.load_local_identity().unwrap().unwrap();
        assert_eq!(loaded.public_key(), second.public_key());
        assert_eq!(loaded.username().as_str(), "bob");
    }

    #[test]
    fn partial_identity_is_corrupt() {
        let mut agent = KeyAgent::in_memory().unwrap();
        agent.persist(&Identity::generate(u("alice"))).unwrap();
        agent.vault.remove_item(SECURE_KEY_PUBLIC_KEY).unwrap();

        assert!(matches!(
            agent.load_local_identity(),
            Err(IdentityError::KeyFile(_))
        ));
    }

    #[test]
    fn mismatched_public_key_is_corrupt() {
        let mut agent = KeyAgent::in_memory().unwrap();
        agent.persist(&Identity::generate(u("alice"))).unwrap();
        let other = Identity::generate(u("alice")).public_key();
        agent.vault.set_item(SECURE_KEY_PUBLIC_KEY, &other.to_hex()).unwrap();

        assert!(matches!(
            agent.load_local_identity(),
            Err(IdentityError::KeyFile(_))
        ));
    }

    #[test]
    fn bad_hex_is_corrupt() {
        let mut agent = KeyAgent::in_memory().unwrap();
        agent.persist(&Identity::generate(u("alice"))).unwrap();
        agent.vault.set_item(SECURE_KEY_PRIVATE_KEY, "not hex").unwrap();

        assert!(matches!(
            agent.load_local_identity(),
            Err(IdentityError::KeyFile(_))
        ));
    }

    #[test]
    fn wipe_clears_vault() {
        let mut agent = KeyAgent::in_memory().unwrap();
        agent.persist(&Identity::generate(u("alice"))).unwrap();

        agent.wipe().unwrap();
        assert!(!agent.has_stored_identity().unwrap());
        assert!(agent.load_local_identity().unwrap().is_none());
    }

    #[test]
    fn failed_wipe_leaves_identity_intact() {
        let mut agent = KeyAgent::in_memory().unwrap();
        let identity = Identity::generate(u("alice"));
        agent.persist(&identity).unwrap();
        agent
            .vault
            .conn()
            .execute_batch(&format!(
                "CREATE TRIGGER keep_username BEFORE DELETE ON secure_items
                 WHEN old.key = '{SECURE_KEY_USERNAME}'
                 BEGIN SELECT RAISE(ABORT, 'busy'); END;"
            ))
            .unwrap();

        assert!(agent.wipe().is_err());

        let loaded = agent.load_local_identity().unwrap().unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
        assert_eq!(loaded.username(), identity.username());
    }

    #[test]
    fn short_sample_is_entropy_error() {
        let agent = KeyAgent::in_memory().unwrap();
        let err = agent
            .derive_key_pair(&mut vec![1u8; 10], &u("alice"))
            .unwrap_err();
        assert!(matches!(err, IdentityError::EntropyUnavailable(_)));
    }

    #[test]
    fn vault_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let identity = Identity::generate(u("alice"));

        KeyAgent::open(&path).unwrap().persist(&identity).unwrap();

        let reopened = KeyAgent::open(&path).unwrap();
        let loaded = reopened.load_local_identity().unwrap().unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
    }
}
