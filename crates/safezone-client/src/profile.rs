//! First-run profile setup and profile reset.

use safezone_shared::{EntropySource, Identity, Username};
use safezone_store::StoreError;

use crate::directory::Directory;
use crate::error::ProfileError;
use crate::keys::KeyAgent;

/// Create the local identity and publish it.
///
/// Validates the username, checks it is free, derives the key pair from one
/// entropy sample, stores it in the vault and publishes the public key.  If
/// publishing fails the vault is wiped again, leaving no half-created
/// profile behind.
pub fn setup_profile<S>(
    keys: &mut KeyAgent,
    directory: &Directory,
    username_input: &str,
    entropy: &mut S,
) -> Result<Identity, ProfileError>
where
    S: EntropySource + ?Sized,
{
    let username = Username::parse(username_input)?;

    if !directory
        .is_available(&username)
        .map_err(ProfileError::Directory)?
    {
        return Err(ProfileError::UsernameTaken(username));
    }

    let identity = keys.derive_key_pair(entropy, &username)?;
    keys.persist(&identity).map_err(ProfileError::Vault)?;

    if let Err(e) = directory.publish(&identity) {
        tracing::warn!(username = %username, error = %e, "publish failed, rolling back local identity");
        if let Err(wipe_err) = keys.wipe() {
            tracing::error!(error = %wipe_err, "could not wipe vault after failed publish");
        }
        return Err(match e {
            StoreError::AlreadyExists(_) => ProfileError::UsernameTaken(username),
            other => ProfileError::Directory(other),
        });
    }

    tracing::info!(username = %username, "profile created");
    Ok(identity)
}

/// Remove the local identity.  The directory entry stays published.
pub fn reset_profile(keys: &mut KeyAgent) -> Result<(), ProfileError> {
    keys.wipe().map_err(ProfileError::Vault)
}
