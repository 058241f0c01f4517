//! Persistence interface for completed sessions.
//!
//! The tracker only needs "get or create" lookups plus an append; the SQLite
//! implementation lives in `ob-db`.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MemberId;

/// A stored member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: MemberId,
    pub name: String,
}

/// A stored game, unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
}

/// Storage collaborator for completed play sessions.
///
/// `ensure_*` methods have get-or-create semantics: a concurrent creation of
/// the same record must resolve to the existing row rather than fail. The
/// returned flag is `true` when the record was created by this call.
pub trait ActivityStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn ensure_user(&self, id: &MemberId, name: &str) -> Result<(User, bool), Self::Error>;

    fn ensure_game(&self, name: &str) -> Result<(Game, bool), Self::Error>;

    fn record_activity(
        &self,
        user: &User,
        game: &Game,
        seconds: i64,
        platform: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Self::Error>;
}

/// Serializes access to a store that isn't `Sync` (e.g. a single connection).
impl<S: ActivityStore> ActivityStore for Mutex<S> {
    type Error = S::Error;

    fn ensure_user(&self, id: &MemberId, name: &str) -> Result<(User, bool), Self::Error> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ensure_user(id, name)
    }

    fn ensure_game(&self, name: &str) -> Result<(Game, bool), Self::Error> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ensure_game(name)
    }

    fn record_activity(
        &self,
        user: &User,
        game: &Game,
        seconds: i64,
        platform: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Self::Error> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_activity(user, game, seconds, platform, timestamp)
    }
}
