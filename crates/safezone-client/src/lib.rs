//! # safezone-client
//!
//! Client core for SafeZone: identity setup, the directory, and live
//! end-to-end encrypted chats over the shared document store.

pub mod chats;
pub mod config;
pub mod directory;
pub mod error;
pub mod keys;
pub mod profile;
pub mod state;
pub mod sync;

use safezone_shared::constants::APP_NAME;
use tracing_subscriber::{fmt, EnvFilter};

pub use chats::{ChatList, ChatSummary};
pub use config::ClientConfig;
pub use directory::{Directory, SearchMode};
pub use error::{ClientError, ProfileError, SendFailure, SyncError};
pub use keys::KeyAgent;
pub use state::AppState;
pub use sync::{ChatSubscription, ChatSyncController, MessageBody, MessageView, UndecryptableReason};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.  Calling this
/// again after a subscriber is installed does nothing.
pub fn init_tracing(config: &ClientConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!("Starting {APP_NAME} client");
    }
}
