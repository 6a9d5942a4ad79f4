//! Argon2id password hashing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

use crate::{Error, Result};

/// Hash a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::unknown(format!("failed to hash password: {e}")))
}

/// Check a password against a stored PHC string.
///
/// Returns `Ok(false)` on mismatch. A stored hash that cannot be parsed is
/// reported as `Unknown`.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| Error::unknown(format!("stored password hash is malformed: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::unknown(format!("failed to verify password: {e}"))),
    }
}

/// Check that a string is a parseable PHC hash.
pub fn is_valid_hash(stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok()
}
