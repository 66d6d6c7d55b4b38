//! Host secret hashing
//!
//! Secrets are stored as Argon2id PHC strings and checked with
//! [`verify_secret`], never by string equality.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::seq::IndexedRandom;

use crate::error::{Error, Result};

/// Length of generated secrets
pub const GENERATED_SECRET_LEN: usize = 10;

/// Alphabet for generated secrets (no easily confused characters)
const SECRET_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Hash a raw secret with a fresh salt
pub fn hash_secret(raw: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| Error::hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a raw secret against a stored hash.
///
/// A stored value that is not a PHC hash string never verifies.
pub fn verify_secret(raw: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw.as_bytes(), &parsed)
        .is_ok()
}

/// Draw a random secret suitable for handing out once
pub fn random_secret() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_SECRET_LEN)
        .filter_map(|_| SECRET_ALPHABET.choose(&mut rng).map(|&b| char::from(b)))
        .collect()
}
