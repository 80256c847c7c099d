//! API key generation and verification.
use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::Rng;

const ARGON2_MEMORY: u32 = 64 * 1024; // KiB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const KEY_PREFIX: &str = "kontrol";
const SECRET_BYTES: usize = 24;

/// Mints and verifies cluster API keys.
///
/// Keys look like `kontrol_<hex secret>`. Only the Argon2id hash is stored;
/// verification is the library's constant-time password check, so lookups
/// leak nothing about how close a guess was.
pub struct KeyGenerator {
    argon2: Argon2<'static>,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Returns `(raw_key, hash)`; the raw key is shown once and never stored.
    pub fn generate(&self) -> Result<(String, String)> {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill(&mut bytes);
        let raw_key = format!("{KEY_PREFIX}_{}", hex::encode(bytes));
        let hash = self.hash(&raw_key)?;
        Ok((raw_key, hash))
    }

    pub fn hash(&self, key: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(key.as_bytes(), &salt)
            .map_err(|e| anyhow!("failed to hash api key: {e}"))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, key: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("invalid key hash: {e}"))?;
        match self.argon2.verify_password(key.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("failed to verify api key: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_verifies_against_its_hash() {
        let generator = KeyGenerator::new();
        let (raw, hash) = generator.generate().unwrap();
        assert!(raw.starts_with("kontrol_"));
        assert!(generator.verify(&raw, &hash).unwrap());
        assert!(!generator.verify("kontrol_wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let generator = KeyGenerator::new();
        let a = generator.hash("kontrol_abc").unwrap();
        let b = generator.hash("kontrol_abc").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        let generator = KeyGenerator::new();
        assert!(generator.verify("kontrol_abc", "not-a-phc-string").is_err());
    }
}
