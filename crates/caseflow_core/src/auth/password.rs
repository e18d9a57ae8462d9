//! Password hashing and policy checks.
//!
//! Hashes are iterated, salted SHA-256 rendered as lowercase hex.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

const HASH_ROUNDS: u32 = 10_000;
const MIN_PASSWORD_CHARS: usize = 8;
const DUMMY_SALT: &str = "00000000000000000000000000000000";

static DUMMY_HASH: Lazy<String> = Lazy::new(|| hash_password("", DUMMY_SALT));

/// Generates a random per-user salt.
pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Derives the stored hash for `password` with `salt`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut digest = {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hasher.finalize()
    };

    for _ in 1..HASH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(salt.as_bytes());
        digest = hasher.finalize();
    }

    hex::encode(digest)
}

/// Compares a candidate password against a stored hash in constant time.
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let candidate = hash_password(password, salt);
    bool::from(candidate.as_bytes().ct_eq(expected_hash.as_bytes()))
}

/// Runs a full verification against a throwaway credential.
///
/// Used when no account matches so a failed login costs the same either way.
pub fn verify_against_dummy(password: &str) -> bool {
    verify_password(password, DUMMY_SALT, &DUMMY_HASH)
}

/// Returns a human-readable reason when `password` violates policy.
pub fn password_policy_violation(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Some("password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Some("password must contain a letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("password must contain a digit");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        generate_salt, hash_password, password_policy_violation, verify_against_dummy,
        verify_password, DUMMY_HASH, DUMMY_SALT,
    };

    #[test]
    fn hash_is_deterministic_per_salt() {
        let first = hash_password("s3cret-pass", "salt");
        assert_eq!(first, hash_password("s3cret-pass", "salt"));
        assert_ne!(first, hash_password("s3cret-pass", "other"));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn verify_accepts_only_matching_password() {
        let salt = generate_salt();
        let stored = hash_password("correct-h0rse", &salt);
        assert!(verify_password("correct-h0rse", &salt, &stored));
        assert!(!verify_password("wrong-h0rse", &salt, &stored));
    }

    #[test]
    fn verify_rejects_truncated_or_foreign_hashes() {
        let salt = generate_salt();
        let stored = hash_password("correct-h0rse", &salt);
        assert!(!verify_password("correct-h0rse", &salt, &stored[..32]));
        assert!(!verify_password("correct-h0rse", &salt, ""));
        assert!(!verify_password("correct-h0rse", &generate_salt(), &stored));
    }

    #[test]
    fn dummy_credential_has_the_stored_shape_and_never_matches() {
        assert_eq!(DUMMY_SALT.len(), generate_salt().len());
        assert_eq!(DUMMY_HASH.len(), hash_password("x", &generate_salt()).len());
        assert!(!verify_against_dummy("correct-h0rse"));
    }

    #[test]
    fn policy_requires_length_letter_and_digit() {
        assert!(password_policy_violation("short1").is_some());
        assert!(password_policy_violation("onlyletters").is_some());
        assert!(password_policy_violation("12345678").is_some());
        assert!(password_policy_violation("letters123").is_none());
    }
}
