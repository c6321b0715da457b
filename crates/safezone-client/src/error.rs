use thiserror::Error;

use safezone_shared::{ChatId, CryptoError, IdentityError, Username};
use safezone_store::StoreError;

/// Errors from chat sync, sending and read tracking.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No public key on record for {0}")]
    RecipientKeyMissing(Username),

    #[error("Could not open message feed: {0}")]
    FeedSubscriptionFailed(String),

    #[error("Atomic write failed, nothing was applied: {0}")]
    AtomicWriteFailed(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{0} is not a participant of this chat")]
    NotAParticipant(Username),

    #[error("Invalid chat participants: {0}")]
    InvalidParticipants(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A send that did not go out.  Carries the draft so the UI can restore it.
#[derive(Error, Debug)]
#[error("Send failed: {error}")]
pub struct SendFailure {
    pub draft: String,
    #[source]
    pub error: SyncError,
}

/// Errors from profile setup.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Username {0} is already taken")]
    UsernameTaken(Username),

    #[error("Local vault error: {0}")]
    Vault(StoreError),

    #[error("Directory error: {0}")]
    Directory(StoreError),
}

impl ProfileError {
    /// Whether repeating the same setup could succeed.  Input problems need
    /// a different username instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProfileError::Identity(IdentityError::EntropyUnavailable(_))
            | ProfileError::Identity(IdentityError::KeyDerivationFailed(_)) => true,
            ProfileError::Identity(_) => false,
            ProfileError::UsernameTaken(_) => false,
            ProfileError::Vault(_) | ProfileError::Directory(_) => true,
        }
    }
}

/// Top-level error for [`AppState`](crate::state::AppState) operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No identity loaded")]
    NoIdentity,

    #[error("A profile already exists on this device")]
    ProfileExists,

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Send(#[from] SendFailure),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
