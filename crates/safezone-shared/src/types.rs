use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CHAT_ID_SEPARATOR, PUBKEY_SIZE, USERNAME_MAX_LEN, USERNAME_MIN_LEN};
use crate::error::IdentityError;

/// A user-chosen handle. Unique in the directory and immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate raw user input. Surrounding whitespace is trimmed first.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let trimmed = input.trim();
        let len = trimmed.chars().count();

        if len < USERNAME_MIN_LEN {
            return Err(IdentityError::InvalidUsername(format!(
                "must be at least {USERNAME_MIN_LEN} characters"
            )));
        }
        if len > USERNAME_MAX_LEN {
            return Err(IdentityError::InvalidUsername(format!(
                "must be at most {USERNAME_MAX_LEN} characters"
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
        {
            return Err(IdentityError::InvalidUsername(format!(
                "character {bad:?} is not allowed"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic two-party chat identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    /// Build the id for a pair of users. Argument order does not matter.
    pub fn for_pair(a: &Username, b: &Username) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{CHAT_ID_SEPARATOR}{second}"))
    }

    /// Wrap an id read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// X25519 public key (32 bytes), the only key material ever published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; PUBKEY_SIZE]);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s.trim()).map_err(|_| IdentityError::InvalidKeyBytes)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; PUBKEY_SIZE] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKeyBytes)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn test_username_trimmed() {
        assert_eq!(user("  alice ").as_str(), "alice");
    }

    #[test]
    fn test_username_rejects_short_and_reserved() {
        assert!(Username::parse("ab").is_err());
        assert!(Username::parse("   ").is_err());
        assert!(Username::parse("bob_smith").is_err());
        assert!(Username::parse("a".repeat(33).as_str()).is_err());
        assert!(Username::parse("jo.doe-2").is_ok());
    }

    #[test]
    fn test_chat_id_order_independent() {
        let bob = user("bob");
        let alice = user("alice");
        assert_eq!(ChatId::for_pair(&bob, &alice), ChatId::for_pair(&alice, &bob));
        assert_eq!(ChatId::for_pair(&bob, &alice).as_str(), "alice_bob");
    }

    #[test]
    fn test_public_key_hex_roundtrip_and_length() {
        let key = PublicKey([7u8; 32]);
        assert_eq!(PublicKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_username_try_from_validates() {
        assert!(Username::try_from("carol".to_string()).is_ok());
        assert!(Username::try_from("x".to_string()).is_err());
    }
}
