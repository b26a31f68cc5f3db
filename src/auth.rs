//! Authentication capability.
//!
//! A single polymorphic seam: callers hold `Arc<dyn Authenticator>` and never
//! care which concrete scheme validated the credential. Today the only
//! variant is password-based.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::Crypto;
use crate::database::{StoreError, UserStore};
use crate::error::{Result, ServerError};
use crate::user::User;

/// Email + plaintext password submitted at login.
#[derive(Clone)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

// Hand-written so a logged credential never carries the plaintext password.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates a credential and returns the authenticated identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate or fail with [`ServerError::InvalidCredentials`].
    ///
    /// The returned [`User`] carries no password hash.
    async fn authenticate(&self, credential: &Credential) -> Result<User>;
}

/// Credential check against the stored Argon2id hash.
pub struct PasswordAuthenticator {
    users: Arc<dyn UserStore>,
    crypto: Arc<Crypto>,
}

impl PasswordAuthenticator {
    /// Create a new [`PasswordAuthenticator`].
    pub fn new(users: Arc<dyn UserStore>, crypto: Arc<Crypto>) -> Self {
        Self { users, crypto }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self, credential: &Credential) -> Result<User> {
        // Unknown user and wrong password must be indistinguishable.
        let user = match self.users.find_by_email(&credential.email).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ServerError::InvalidCredentials);
            },
            Err(err) => return Err(err.into()),
        };

        if !self
            .crypto
            .pwd
            .verify_password(&credential.password, &user.password)?
        {
            return Err(ServerError::InvalidCredentials);
        }

        Ok(user.strip_password())
    }
}
