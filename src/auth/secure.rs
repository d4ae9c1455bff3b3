//! Secret wrappers that are zeroized on drop.
//!
//! Access and refresh tokens only live in memory for the lifetime of a
//! session; these types make sure they are wiped when the session ends and
//! never show up in `Debug` output or logs.

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret string that zeroizes its contents on drop.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}
