//! Storage layer for play sessions.
//!
//! Provides persistence for users, games and recorded activities using
//! `rusqlite`, and implements [`ActivityStore`] for the session tracker.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! To share one connection between workers wrap it in a `Mutex<Database>`, which
//! implements [`ActivityStore`] as well. Separate `Database` instances on the same
//! file are also safe: get-or-create lookups resolve unique-name races to the
//! existing row.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). Because every row uses the same format:
//! - Lexicographic ordering matches chronological ordering
//! - Range filters can compare strings directly
//! - Values are human-readable and always UTC

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use ob_core::{ActivityStore, Game, MemberId, User};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for activity {activity_id}: {timestamp}")]
    TimestampParse {
        activity_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Session durations are never negative.
    #[error("refusing to record negative duration: {0} seconds")]
    NegativeDuration(i64),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A recorded play session joined with its user and game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: String,
    pub game: String,
    pub seconds: i64,
    pub platform: String,
}

/// Total playtime for one game or one user within a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playtime {
    pub name: String,
    pub seconds: i64,
    pub sessions: i64,
}

/// Row counts for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: i64,
    pub games: i64,
    pub activities: i64,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Members keyed by the event source's snowflake (up to 20 digits)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            -- One row per completed play session
            -- timestamp: when the session ended, RFC 3339 UTC
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                user_id TEXT NOT NULL,
                game_id INTEGER NOT NULL,
                seconds INTEGER NOT NULL,
                platform TEXT NOT NULL DEFAULT 'pc',
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (game_id) REFERENCES games(id)
            );

            CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp);
            CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id);
            CREATE INDEX IF NOT EXISTS idx_activities_game ON activities(game_id);
            ",
        )?;
        Ok(())
    }

    /// Lists all recorded activities ordered by timestamp then ID.
    pub fn list_activities(&self) -> Result<Vec<ActivityRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT a.id, a.timestamp, u.id, u.name, g.name, a.seconds, a.platform
            FROM activities a
            JOIN users u ON u.id = a.user_id
            JOIN games g ON g.id = a.game_id
            ORDER BY a.timestamp ASC, a.id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut activities = Vec::new();
        for row in rows {
            let (id, timestamp, user_id, user_name, game, seconds, platform) = row?;
            activities.push(ActivityRecord {
                id,
                timestamp: parse_timestamp(&timestamp, id)?,
                user_id,
                user_name,
                game,
                seconds,
                platform,
            });
        }
        Ok(activities)
    }

    /// Sums playtime per game within `[start, end)`, longest first.
    ///
    /// When `member` is set only that member's sessions are counted.
    pub fn playtime_by_game(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        member: Option<&MemberId>,
    ) -> Result<Vec<Playtime>, DbError> {
        self.playtime(
            "
            SELECT g.name, SUM(a.seconds), COUNT(*)
            FROM activities a
            JOIN games g ON g.id = a.game_id
            WHERE a.timestamp >= ?1 AND a.timestamp < ?2
              AND (?3 IS NULL OR a.user_id = ?3)
            GROUP BY g.id
            ORDER BY SUM(a.seconds) DESC, g.name ASC
            ",
            start,
            end,
            member,
        )
    }

    /// Sums playtime per member within `[start, end)`, longest first.
    pub fn playtime_by_user(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        member: Option<&MemberId>,
    ) -> Result<Vec<Playtime>, DbError> {
        self.playtime(
            "
            SELECT u.name, SUM(a.seconds), COUNT(*)
            FROM activities a
            JOIN users u ON u.id = a.user_id
            WHERE a.timestamp >= ?1 AND a.timestamp < ?2
              AND (?3 IS NULL OR a.user_id = ?3)
            GROUP BY u.id
            ORDER BY SUM(a.seconds) DESC, u.name ASC
            ",
            start,
            end,
            member,
        )
    }

    fn playtime(
        &self,
        sql: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        member: Option<&MemberId>,
    ) -> Result<Vec<Playtime>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![
                format_timestamp(start),
                format_timestamp(end),
                member.map(MemberId::as_str)
            ],
            |row| {
                Ok(Playtime {
                    name: row.get(0)?,
                    seconds: row.get(1)?,
                    sessions: row.get(2)?,
                })
            },
        )?;
        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }

    /// Counts stored users, games and activities.
    pub fn counts(&self) -> Result<StoreCounts, DbError> {
        let counts = self.conn.query_row(
            "
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM games),
                (SELECT COUNT(*) FROM activities)
            ",
            [],
            |row| {
                Ok(StoreCounts {
                    users: row.get(0)?,
                    games: row.get(1)?,
                    activities: row.get(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Timestamp of the most recently recorded activity.
    pub fn last_activity_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, timestamp FROM activities ORDER BY timestamp DESC, id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        latest
            .map(|(id, timestamp)| parse_timestamp(&timestamp, id))
            .transpose()
    }
}

impl ActivityStore for Database {
    type Error = DbError;

    fn ensure_user(&self, id: &MemberId, name: &str) -> Result<(User, bool), DbError> {
        let inserted = self.conn.execute(
            "INSERT INTO users (id, name) VALUES (?, ?) ON CONFLICT(id) DO NOTHING",
            params![id.as_str(), name],
        )?;
        let stored_name: String = self.conn.query_row(
            "SELECT name FROM users WHERE id = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok((
            User {
                id: id.clone(),
                name: stored_name,
            },
            inserted == 1,
        ))
    }

    fn ensure_game(&self, name: &str) -> Result<(Game, bool), DbError> {
        let inserted = self.conn.execute(
            "INSERT INTO games (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            [name],
        )?;
        let game = self.conn.query_row(
            "SELECT id, name FROM games WHERE name = ?",
            [name],
            |row| {
                Ok(Game {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok((game, inserted == 1))
    }

    fn record_activity(
        &self,
        user: &User,
        game: &Game,
        seconds: i64,
        platform: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if seconds < 0 {
            return Err(DbError::NegativeDuration(seconds));
        }
        self.conn.execute(
            "
            INSERT INTO activities (timestamp, user_id, game_id, seconds, platform)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                format_timestamp(timestamp),
                user.id.as_str(),
                game.id,
                seconds,
                platform
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(timestamp: &str, activity_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            activity_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
