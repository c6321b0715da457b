/// Application name
pub const APP_NAME: &str = "SafeZone";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum plaintext message size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Smallest entropy sample (e.g. a captured still) accepted for key derivation
pub const MIN_ENTROPY_SAMPLE_BYTES: usize = 64;

/// Extra BLAKE3 rounds applied to the identity seed
pub const SEED_STRETCH_ROUNDS: u32 = 4096;

/// Username length bounds (after trimming)
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;

/// Separator between the two sorted usernames of a chat id.
/// Never valid inside a username.
pub const CHAT_ID_SEPARATOR: char = '_';

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_IDENTITY_SEED: &str = "safezone-identity-seed-v1";
pub const KDF_CONTEXT_IDENTITY_STRETCH: &str = "safezone-identity-stretch-v1";
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "safezone-message-key-v1";

/// Secure store entries holding the local identity
pub const SECURE_KEY_PRIVATE_KEY: &str = "safezone.private_key";
pub const SECURE_KEY_PUBLIC_KEY: &str = "safezone.public_key";
pub const SECURE_KEY_USERNAME: &str = "safezone.username";
