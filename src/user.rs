//! User record as saved on database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as saved on database.
///
/// The password hash is serde-skipped: it can never leak into a response
/// body or an outgoing event.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Identity without credential material, as handed to callers after
    /// authentication.
    pub fn strip_password(mut self) -> Self {
        self.password = String::default();
        self
    }
}
