//! Security utilities: password hashing and single-use secrets.

pub mod password;
pub mod secrets;

pub use password::{hash_password, verify_password};
pub use secrets::{Secret, generate_password, generate_token, token_digest, token_matches};
