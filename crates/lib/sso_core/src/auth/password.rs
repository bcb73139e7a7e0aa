//! Password hashing via bcrypt.

use super::AuthError;

/// bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// One-way salted hashing with verification.
///
/// Called from the blocking pool, so implementations may be CPU-heavy.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(BCRYPT_COST)
    }
}

/// Longest password bcrypt reads in full, in bytes. Its 72-byte input
/// includes a trailing NUL.
pub const BCRYPT_MAX_BYTES: usize = 71;

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::non_truncating_hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Passwords past bcrypt's input limit never match; no stored hash can
    /// have been made from one.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        match bcrypt::non_truncating_verify(password, hash) {
            Ok(matched) => Ok(matched),
            Err(bcrypt::BcryptError::Truncation(_)) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("bcrypt verify: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = BcryptHasher::new(4);
        let hash = hasher.hash("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("battery staple", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = BcryptHasher::new(4);
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn passwords_sharing_a_long_prefix_do_not_match() {
        let hasher = BcryptHasher::new(4);
        let prefix = format!("{}x", "ä".repeat(35));
        assert_eq!(prefix.len(), BCRYPT_MAX_BYTES);
        let hash = hasher.hash(&prefix).unwrap();

        assert!(hasher.verify(&prefix, &hash).unwrap());
        assert!(!hasher.verify(&format!("{prefix}TotallyDifferent"), &hash).unwrap());
    }

    #[test]
    fn overlong_password_is_not_hashed() {
        let hasher = BcryptHasher::new(4);
        let err = hasher.hash(&"ä".repeat(36)).unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn malformed_hash_is_an_internal_error() {
        let hasher = BcryptHasher::new(4);
        let err = hasher.verify("pw", "not-a-bcrypt-hash").unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
