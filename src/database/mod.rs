//! Store contracts and backends.
//!
//! The core flows only ever talk to [`UserStore`] and [`ResetTokenStore`];
//! which backend sits behind them is wiring.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};

use crate::AppState;
use crate::config::Postgres as PostgresConfig;
use crate::user::User;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "gatehouse";
pub const DEFAULT_POOL_SIZE: u32 = 10;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated on `{field}`")]
    UniqueViolation { field: &'static str },
    #[error("store backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Fields needed to insert a [`User`]. `password` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Active password-reset record, one per email. Never leaves the store layer,
/// so it has no serialized form.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct PasswordReset {
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with [`StoreError::UniqueViolation`] when the
    /// email is already registered.
    async fn create(&self, user: NewUser) -> Result<User>;

    /// Exact-match lookup on the email column.
    async fn find_by_email(&self, email: &str) -> Result<User>;

    async fn find_by_id(&self, id: i64) -> Result<User>;

    /// Set `email_verified_at`. Only called by the verification flow.
    async fn set_verified_at(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Replace the stored password hash. Only called by the reset flow.
    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<()>;
}

/// Persistence of password-reset tokens, keyed by email.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Insert or replace the record for `email`. Replacement is the per-email
    /// mutual exclusion: at most one token is valid at any time.
    async fn upsert(
        &self,
        email: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_by_email(&self, email: &str) -> Result<PasswordReset>;

    async fn delete_by_email(&self, email: &str) -> Result<()>;
}

/// Store handle shared with Axum.
#[derive(Clone)]
pub struct Database {
    pub users: Arc<dyn UserStore>,
    pub resets: Arc<dyn ResetTokenStore>,
}

impl Database {
    /// Connect to PostgreSQL and run pending migrations.
    pub async fn postgres(
        config: &PostgresConfig,
    ) -> std::result::Result<Self, sqlx::Error> {
        let store = Arc::new(PgStore::connect(config).await?);

        Ok(Self {
            users: store.clone(),
            resets: store,
        })
    }

    /// Volatile in-process store. Keeps tests and storeless dev runs going.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());

        Self {
            users: store.clone(),
            resets: store,
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
