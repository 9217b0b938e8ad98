use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use thiserror::Error;

/// Stand-in verified for unknown accounts so lookups and wrong passwords
/// take the same time.
const DUMMY_PASSWORD: &str = "buspass-dummy-credential";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Argon2id hashing keyed with a server-side pepper. Used for both citizen
/// and administrator credentials.
pub struct CredentialHasher {
    pepper: String,
    params: Params,
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("pepper", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(pepper: impl Into<String>) -> Result<Self, CredentialError> {
        Self::with_params(pepper, Params::default())
    }

    pub fn with_params(pepper: impl Into<String>, params: Params) -> Result<Self, CredentialError> {
        let mut hasher = Self {
            pepper: pepper.into(),
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>, CredentialError> {
        Argon2::new_with_secret(
            self.pepper.as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|e| CredentialError::Hashing(format!("Failed to initialize Argon2: {}", e)))
    }

    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Constant-time check of `password` against a stored PHC string.
    /// Malformed stored hashes never match.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        match self.argon2() {
            Ok(argon2) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Burns one verification for an account that does not exist.
    pub fn verify_missing(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

#[cfg(test)]
pub(crate) fn cheap_params() -> Params {
    Params::new(1024, 1, 1, None).expect("valid argon2 params")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(pepper: &str) -> CredentialHasher {
        CredentialHasher::with_params(pepper, cheap_params()).expect("hasher builds")
    }

    #[test]
    fn test_hash_is_argon2id_and_not_plaintext() {
        let hasher = hasher("pepper");
        let hash = hasher.hash("pw").expect("hash");

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("pw$"));
    }

    #[test]
    fn test_verify_accepts_correct_password_only() {
        let hasher = hasher("pepper");
        let hash = hasher.hash("correct horse").expect("hash");

        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("wrong horse", &hash));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let hasher = hasher("pepper");
        assert_ne!(hasher.hash("pw").expect("hash"), hasher.hash("pw").expect("hash"));
    }

    #[test]
    fn test_different_pepper_does_not_verify() {
        let hash = hasher("pepper-a").hash("pw").expect("hash");
        assert!(!hasher("pepper-b").verify("pw", &hash));
    }

    #[test]
    fn test_plaintext_stored_value_never_matches() {
        let hasher = hasher("pepper");
        assert!(!hasher.verify("admin123", "admin123"));
    }

    #[test]
    fn test_debug_redacts_pepper() {
        let rendered = format!("{:?}", hasher("super-secret-pepper"));
        assert!(!rendered.contains("super-secret-pepper"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
