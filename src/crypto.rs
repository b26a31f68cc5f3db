//! Cryptographic logics: password hashing, token generation and
//! verification identifiers.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha1::{Digest, Sha1};

use crate::config::Argon2 as ArgonConfig;

/// Raw byte length of generated secrets (256 bits before hex encoding).
pub const TOKEN_LENGTH: usize = 32;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    /// Stored digest is not a valid PHC string. This is a programming or
    /// data-corruption error, never caused by user input.
    #[error("stored password digest is malformed")]
    MalformedDigest,
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
    pub tokens: TokenGenerator,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
            tokens: TokenGenerator,
        })
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2 {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id with a fresh random salt.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC string.
    ///
    /// Returns `Ok(false)` on mismatch. The comparison itself is the
    /// scheme's constant-time check.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> Result<bool> {
        let parsed = PasswordHash::new(phc_hash)
            .map_err(|_| CryptoError::MalformedDigest)?;

        Ok(self
            .argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok())
    }
}

/// Produces opaque secrets from the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenGenerator;

impl TokenGenerator {
    /// Generate a 256-bit random token, hex encoded.
    pub fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// Deterministic identifier embedded in email-verification links.
///
/// Hex-encoded SHA-1 digest of the raw email string. Derives only from the
/// email: it never expires and changes only when the email does.
pub fn verification_identifier(email: &str) -> String {
    hex::encode(Sha1::digest(email.as_bytes()))
}
