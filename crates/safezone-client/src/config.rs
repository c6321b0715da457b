//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration.

use std::path::PathBuf;

use safezone_store::{Database, DEFAULT_WATCH_BUFFER};

/// Default tracing filter when neither `RUST_LOG` nor `SAFEZONE_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "safezone_client=debug,safezone_store=info,warn";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Document store (directory, chats, messages).
    /// Env: `SAFEZONE_STORE_PATH`
    /// Default: `<data dir>/store.db`
    pub store_path: PathBuf,

    /// Device-local vault holding the private key.
    /// Env: `SAFEZONE_VAULT_PATH`
    /// Default: `<data dir>/vault.db`
    pub vault_path: PathBuf,

    /// Snapshots buffered per live subscription.
    /// Env: `SAFEZONE_FEED_BUFFER`
    /// Default: `32`
    pub feed_buffer: usize,

    /// Fallback tracing filter.  `RUST_LOG` still wins when set.
    /// Env: `SAFEZONE_LOG`
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_path: data_file("store.db"),
            vault_path: data_file("vault.db"),
            feed_buffer: DEFAULT_WATCH_BUFFER,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("SAFEZONE_STORE_PATH").filter(|p| !p.trim().is_empty()) {
            config.store_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("SAFEZONE_VAULT_PATH").filter(|p| !p.trim().is_empty()) {
            config.vault_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("SAFEZONE_FEED_BUFFER") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.feed_buffer = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid SAFEZONE_FEED_BUFFER, using default");
                }
            }
        }

        if let Some(filter) = lookup("SAFEZONE_LOG").filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        config
    }
}

fn data_file(name: &str) -> PathBuf {
    match Database::default_path(name) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(error = %e, file = name, "No data directory, using working directory");
            PathBuf::from(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_with(&[]);
        assert_eq!(config.feed_buffer, 32);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.store_path.ends_with("store.db"));
        assert!(config.vault_path.ends_with("vault.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("SAFEZONE_STORE_PATH", "/tmp/s.db"),
            ("SAFEZONE_VAULT_PATH", "/tmp/v.db"),
            ("SAFEZONE_FEED_BUFFER", "8"),
            ("SAFEZONE_LOG", "trace"),
        ]);
        assert_eq!(config.store_path, PathBuf::from("/tmp/s.db"));
        assert_eq!(config.vault_path, PathBuf::from("/tmp/v.db"));
        assert_eq!(config.feed_buffer, 8);
        assert_eq!(config.log_filter, "trace");
    }

    #[test]
    fn test_invalid_buffer_keeps_default() {
        assert_eq!(config_with(&[("SAFEZONE_FEED_BUFFER", "lots")]).feed_buffer, 32);
        assert_eq!(config_with(&[("SAFEZONE_FEED_BUFFER", "0")]).feed_buffer, 32);
    }
}
