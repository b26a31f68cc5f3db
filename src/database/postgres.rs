//! PostgreSQL store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Postgres as PostgresConfig;
use crate::database::{
    DEFAULT_CREDENTIALS, DEFAULT_DATABASE_NAME, DEFAULT_POOL_SIZE, NewUser,
    PasswordReset, Result, ResetTokenStore, StoreError, UserStore,
};
use crate::user::User;

/// Store backend over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Init the connection pool and run pending migrations.
    pub async fn connect(
        config: &PostgresConfig,
    ) -> std::result::Result<Self, sqlx::Error> {
        let username = config
            .username
            .clone()
            .unwrap_or(DEFAULT_CREDENTIALS.into());
        let password = config
            .password
            .clone()
            .unwrap_or(DEFAULT_CREDENTIALS.into());
        let database = config
            .database
            .clone()
            .unwrap_or(DEFAULT_DATABASE_NAME.into());

        let addr = format!(
            "postgres://{username}:{password}@{}/{database}",
            config.address
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE))
            .connect(&addr)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        tracing::info!(hostname = %config.address, %database, "postgres connected");

        Ok(Self { pool })
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation { field: "email" }
        },
        err => StoreError::Backend(Box::new(err)),
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password, email_verified_at, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password)
                VALUES ($1, $2, $3)
                RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn find_by_id(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn set_verified_at(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET email_verified_at = $1, updated_at = $1
                WHERE id = $2",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET password = $1, updated_at = NOW()
                WHERE id = $2",
        )
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn upsert(
        &self,
        email: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO password_resets (email, token, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (email)
                DO UPDATE SET token = $2, created_at = $3",
        )
        .bind(email)
        .bind(token)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<PasswordReset> {
        sqlx::query_as::<_, PasswordReset>(
            "SELECT email, token, created_at FROM password_resets
                WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn delete_by_email(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        Ok(())
    }
}
