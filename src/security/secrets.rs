//! Single-use tokens and generated passwords.
//!
//! Tokens are only ever stored as SHA-256 digests; the clear value travels
//! once to the mailer and is then dropped.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

const TOKEN_LEN: usize = 48;
const PASSWORD_LEN: usize = 32;

/// A clear-text secret (token or password). Wiped on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The clear value. Callers relay it and must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

fn random_alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate an unguessable verification/reset token.
pub fn generate_token() -> Secret {
    Secret(random_alphanumeric(TOKEN_LEN))
}

/// Generate a new account password.
pub fn generate_password() -> Secret {
    Secret(random_alphanumeric(PASSWORD_LEN))
}

/// Hex SHA-256 digest under which a token is stored.
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Constant-time comparison of a presented token against a stored digest.
pub fn token_matches(presented: &str, stored_digest: &str) -> bool {
    let digest = token_digest(presented);
    digest.as_bytes().ct_eq(stored_digest.as_bytes()).into()
}
