use std::fmt;

use rand::rngs::OsRng;
use x25519_dalek::{SharedSecret, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::constants::{
    KDF_CONTEXT_IDENTITY_SEED, KDF_CONTEXT_IDENTITY_STRETCH, MIN_ENTROPY_SAMPLE_BYTES,
    SECRET_KEY_SIZE, SEED_STRETCH_ROUNDS,
};
use crate::entropy::EntropySource;
use crate::error::IdentityError;
use crate::types::{PublicKey, Username};

/// A user's long-lived X25519 identity.
/// The secret never leaves the device; only [`Identity::public_key`] is published.
#[derive(Clone)]
pub struct Identity {
    username: Username,
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Derive an identity from one entropy sample, salted with the username.
    ///
    /// The sample digest and the username go through a BLAKE3 derive-key
    /// hasher, then [`SEED_STRETCH_ROUNDS`] further rounds; the result seeds
    /// the X25519 secret.
    pub fn derive<S>(source: &mut S, username: &Username) -> Result<Self, IdentityError>
    where
        S: EntropySource + ?Sized,
    {
        let mut sample = source.read_sample()?;
        if sample.len() < MIN_ENTROPY_SAMPLE_BYTES {
            let len = sample.len();
            sample.zeroize();
            return Err(IdentityError::EntropyUnavailable(format!(
                "sample has {len} bytes, need at least {MIN_ENTROPY_SAMPLE_BYTES}"
            )));
        }

        let mut digest = *blake3::hash(&sample).as_bytes();
        sample.zeroize();

        let seed = Zeroizing::new(stretch_seed(&digest, username));
        digest.zeroize();

        Self::from_secret_bytes(username.clone(), &seed)
    }

    /// Generate a random identity (no entropy sample involved).
    pub fn generate(username: Username) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes());
        Self {
            username,
            secret,
            public,
        }
    }

    /// Restore an identity from raw secret bytes.
    pub fn from_secret_bytes(
        username: Username,
        secret: &[u8; SECRET_KEY_SIZE],
    ) -> Result<Self, IdentityError> {
        if secret.iter().all(|b| *b == 0) {
            return Err(IdentityError::KeyDerivationFailed("degenerate all-zero seed"));
        }

        let secret = StaticSecret::from(*secret);
        let dalek_public = x25519_dalek::PublicKey::from(&secret);
        if !secret.diffie_hellman(&dalek_public).was_contributory() {
            return Err(IdentityError::KeyDerivationFailed("seed maps to a low-order key"));
        }

        Ok(Self {
            username,
            secret,
            public: PublicKey(dalek_public.to_bytes()),
        })
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Raw secret bytes, for the secure store only.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// X25519 agreement with a peer's public key.
    pub(crate) fn agree(&self, peer: &PublicKey) -> SharedSecret {
        self.secret
            .diffie_hellman(&x25519_dalek::PublicKey::from(peer.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("public", &self.public.short())
            .finish_non_exhaustive()
    }
}

fn stretch_seed(sample_digest: &[u8; 32], username: &Username) -> [u8; SECRET_KEY_SIZE] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_IDENTITY_SEED);
    hasher.update(sample_digest);
    hasher.update(username.as_str().as_bytes());
    let mut seed = *hasher.finalize().as_bytes();

    for _ in 0..SEED_STRETCH_ROUNDS {
        let mut round = blake3::Hasher::new_derive_key(KDF_CONTEXT_IDENTITY_STRETCH);
        round.update(&seed);
        round.update(username.as_str().as_bytes());
        seed = *round.finalize().as_bytes();
    }
    seed
}
