//! Volatile in-process store backend.
//!
//! Backs tests and storeless development runs. Every operation takes the
//! write lock for its whole critical section, so uniqueness checks and
//! upserts are atomic relative to each other.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::{
    NewUser, PasswordReset, Result, ResetTokenStore, StoreError, UserStore,
};
use crate::user::User;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<i64, User>>,
    resets: RwLock<HashMap<String, PasswordReset>>,
    next_id: AtomicI64,
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().unwrap();

        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation { field: "email" });
        }

        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User {
            id,
            username: user.username,
            email: user.email,
            password: user.password,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        self.users
            .read()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<User> {
        self.users
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set_verified_at(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().unwrap();
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;

        user.email_verified_at = Some(at);
        user.updated_at = at;
        Ok(())
    }

    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<()> {
        let mut users = self.users.write().unwrap();
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;

        user.password = hash.to_owned();
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn upsert(
        &self,
        email: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.resets.write().unwrap().insert(
            email.to_owned(),
            PasswordReset {
                email: email.to_owned(),
                token: token.to_owned(),
                created_at,
            },
        );
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<PasswordReset> {
        self.resets
            .read()
            .unwrap()
            .get(email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_by_email(&self, email: &str) -> Result<()> {
        self.resets.write().unwrap().remove(email);
        Ok(())
    }
}
