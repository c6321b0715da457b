//! Shared primitives for SafeZone: domain types, identity derivation,
//! per-recipient message encryption and read-receipt aggregation.

pub mod constants;
pub mod crypto;
pub mod entropy;
pub mod error;
pub mod identity;
pub mod receipts;
pub mod types;

pub use crypto::Ciphertext;
pub use entropy::{CapturedImage, EntropySource};
pub use error::{CryptoError, IdentityError};
pub use identity::Identity;
pub use receipts::ReadStatus;
pub use types::{ChatId, PublicKey, Username};
