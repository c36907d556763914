//! Credential hashing and session tokens.
//!
//! Passwords are stored as Argon2id PHC strings; the original scheme this
//! replaces compared plaintext, which is treated here as a defect. Session
//! tokens are random 128-bit values issued by the server at register/login.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;

use crate::error::Error;

/// How long an issued session token stays valid.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

/// Verify a password against a stored PHC string. A malformed stored hash
/// counts as a failed verification rather than an error.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Generate an opaque 128-bit session token as lowercase hex.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
