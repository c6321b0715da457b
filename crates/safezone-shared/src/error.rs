use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(&'static str),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(&'static str),

    #[error("Ciphertext failed authentication")]
    TamperedCiphertext,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Entropy sample unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(&'static str),

    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Stored identity is corrupt: {0}")]
    KeyFile(String),
}
