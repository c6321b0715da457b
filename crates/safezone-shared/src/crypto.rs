use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::constants::{
    KDF_CONTEXT_MESSAGE_KEY, MAX_MESSAGE_SIZE, NONCE_SIZE, PUBKEY_SIZE, SYMMETRIC_KEY_SIZE,
    TAG_SIZE,
};
use crate::error::CryptoError;
use crate::identity::Identity;
use crate::types::{PublicKey, Username};

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Authenticated ciphertext bound to one sender/recipient pair.
/// Layout: nonce (24) || ciphertext || tag (16).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        STANDARD
            .decode(s.trim())
            .map(Self)
            .map_err(|_| CryptoError::DecryptionFailed("ciphertext is not valid base64"))
    }
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` for `recipient` (which may be the local identity itself).
///
/// Each call draws a fresh nonce, so two encryptions of the same text differ.
pub fn encrypt_for(
    identity: &Identity,
    recipient: &PublicKey,
    plaintext: &str,
) -> Result<Ciphertext, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE {
        return Err(CryptoError::EncryptionFailed("plaintext exceeds maximum message size"));
    }

    let key = message_key(identity, recipient)
        .ok_or(CryptoError::EncryptionFailed("recipient key is not a valid curve point"))?;
    let aad = associated_data(&identity.public_key(), recipient);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed("aead seal failed"))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + sealed.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&sealed);
    Ok(Ciphertext(output))
}

/// Decrypt a ciphertext that `sender` encrypted for the local identity.
pub fn decrypt_from(
    identity: &Identity,
    sender: &PublicKey,
    ciphertext: &Ciphertext,
) -> Result<String, CryptoError> {
    let data = ciphertext.as_bytes();
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed("ciphertext too short"));
    }

    let key = message_key(identity, sender)
        .ok_or(CryptoError::DecryptionFailed("sender key is not a valid curve point"))?;
    let aad = associated_data(sender, &identity.public_key());

    let (nonce_bytes, sealed) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let nonce = XNonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::TamperedCiphertext)?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecryptionFailed("plaintext is not valid UTF-8"))
}

/// Encrypt one plaintext independently for every participant.
pub fn seal_for_participants(
    identity: &Identity,
    participants: &BTreeMap<Username, PublicKey>,
    plaintext: &str,
) -> Result<BTreeMap<Username, Ciphertext>, CryptoError> {
    participants
        .iter()
        .map(|(username, key)| Ok((username.clone(), encrypt_for(identity, key, plaintext)?)))
        .collect()
}

// BLAKE3 KDF over the X25519 output and both public keys (sorted, so both
// ends derive the same key). None if the peer key is low-order.
fn message_key(identity: &Identity, peer: &PublicKey) -> Option<Zeroizing<SymmetricKey>> {
    let shared = identity.agree(peer);
    if !shared.was_contributory() {
        return None;
    }

    let own = identity.public_key();
    let (low, high) = if own.0 <= peer.0 {
        (own, *peer)
    } else {
        (*peer, own)
    };

    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_KEY);
    hasher.update(shared.as_bytes());
    hasher.update(low.as_bytes());
    hasher.update(high.as_bytes());
    Some(Zeroizing::new(*hasher.finalize().as_bytes()))
}

fn associated_data(sender: &PublicKey, recipient: &PublicKey) -> [u8; 2 * PUBKEY_SIZE] {
    let mut aad = [0u8; 2 * PUBKEY_SIZE];
    aad[..PUBKEY_SIZE].copy_from_slice(sender.as_bytes());
    aad[PUBKEY_SIZE..].copy_from_slice(recipient.as_bytes());
    aad
}
