//! Server-side session records.
//!
//! Sessions are an explicit collaborator handed to each flow, not ambient
//! request state. A session is established once a flow approves an identity
//! and destroyed on logout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::crypto::TokenGenerator;

/// Record of an authenticated identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Establishes and destroys authenticated sessions, keyed by opaque
/// 256-bit tokens.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    tokens: TokenGenerator,
}

impl SessionManager {
    /// Establish a session for an approved identity, returning its token.
    pub fn establish(&self, user_id: i64) -> String {
        let token = self.tokens.generate();
        self.sessions.write().unwrap().insert(
            token.clone(),
            Session {
                user_id,
                created_at: Utc::now(),
            },
        );
        token
    }

    /// Identity behind a presented token, when one exists.
    pub fn resolve(&self, token: &str) -> Option<i64> {
        self.sessions
            .read()
            .unwrap()
            .get(token)
            .map(|session| session.user_id)
    }

    /// Destroy a session. Returns whether one existed.
    pub fn destroy(&self, token: &str) -> bool {
        self.sessions.write().unwrap().remove(token).is_some()
    }
}
