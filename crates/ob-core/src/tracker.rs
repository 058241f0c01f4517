//! Per-event orchestration of play sessions.
//!
//! Each member moves between *idle* and *playing*. A presence event is
//! normalized and classified, the pending-session cache is updated, and a
//! stop resolves a duration that is handed to the [`ActivityStore`].
//!
//! # Ordering
//!
//! The tracker itself is `Sync` and can be shared, but events for a single
//! member must be fed in arrival order by one caller at a time. Events for
//! different members may be processed concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::{ActivityObservation, CanonicalActivity, normalize};
use crate::duration::{DurationSource, resolve_duration};
use crate::pending::{PendingSessionCache, RecordStart};
use crate::presence::{PresenceChanged, Transition, classify};
use crate::store::ActivityStore;
use crate::types::MemberId;

/// Tracker behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Close the previous game's session when a member switches directly to
    /// another game. When `false` the unfinished session is dropped.
    pub close_on_switch: bool,
}

/// Errors that abort processing of a single event.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The store rejected a completed session.
    #[error("failed to persist session for member {member_id}: {source}")]
    Persistence {
        member_id: MemberId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A finished play session, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedSession {
    pub member_id: MemberId,
    pub member_name: String,
    pub game_name: String,
    pub platform: String,
    pub seconds: i64,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip)]
    pub source: DurationSource,
}

/// How a stop transition ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was recorded.
    Completed(CompletedSession),
    /// No start time was available by any path; nothing was recorded.
    Unresolved(CanonicalActivity),
}

/// What handling one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    Unchanged,
    Started(CanonicalActivity),
    /// A start for the game already pending, e.g. replayed after a
    /// reconnect. The original start is kept.
    AlreadyPlaying(CanonicalActivity),
    Stopped(StopOutcome),
    /// Moved straight to another game. `previous` is `None` when the
    /// unfinished session was dropped.
    Switched {
        previous: Option<StopOutcome>,
        started: CanonicalActivity,
    },
}

/// Turns presence events into recorded play sessions.
pub struct SessionTracker<S> {
    store: S,
    pending: Arc<PendingSessionCache>,
    config: TrackerConfig,
}

impl<S: ActivityStore> SessionTracker<S> {
    pub const fn new(store: S, pending: Arc<PendingSessionCache>, config: TrackerConfig) -> Self {
        Self {
            store,
            pending,
            config,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn pending(&self) -> &PendingSessionCache {
        &self.pending
    }

    /// Handles an event at its observation time, or now if it has none.
    pub fn handle(&self, event: &PresenceChanged) -> Result<TrackerOutcome, TrackerError> {
        let now = event.observed_at.unwrap_or_else(Utc::now);
        self.handle_at(event, now)
    }

    /// Handles an event as if it were observed at `now`.
    pub fn handle_at(
        &self,
        event: &PresenceChanged,
        now: DateTime<Utc>,
    ) -> Result<TrackerOutcome, TrackerError> {
        let before = event.playing_before().map(|obs| (obs, normalize(obs)));
        let after = event.playing_after().map(|obs| (obs, normalize(obs)));
        let transition = classify(
            before.as_ref().map(|(_, activity)| activity),
            after.as_ref().map(|(_, activity)| activity),
        );

        match (transition, before, after) {
            (Transition::Started, _, Some((observation, activity))) => {
                if self.start(event, observation, &activity, now) {
                    Ok(TrackerOutcome::Started(activity))
                } else {
                    Ok(TrackerOutcome::AlreadyPlaying(activity))
                }
            }
            (Transition::Stopped, Some((observation, activity)), _) => {
                let outcome = self.stop(event, observation, activity, now)?;
                Ok(TrackerOutcome::Stopped(outcome))
            }
            (Transition::Switched, Some((prev_obs, prev)), Some((observation, activity))) => {
                let previous = if self.config.close_on_switch {
                    Some(self.stop(event, prev_obs, prev, now))
                } else {
                    None
                };
                // The new game starts even when closing the previous one failed.
                self.start(event, observation, &activity, now);
                let previous = previous.transpose()?;
                Ok(TrackerOutcome::Switched {
                    previous,
                    started: activity,
                })
            }
            _ => {
                tracing::debug!(member_id = %event.member_id, "presence change without play transition");
                Ok(TrackerOutcome::Unchanged)
            }
        }
    }

    fn start(
        &self,
        event: &PresenceChanged,
        observation: &ActivityObservation,
        activity: &CanonicalActivity,
        now: DateTime<Utc>,
    ) -> bool {
        let recorded =
            self.pending
                .record_start(&event.member_id, activity, observation.start(), now);
        match recorded {
            RecordStart::AlreadyPending => {
                tracing::debug!(
                    member_id = %event.member_id,
                    game = %activity.game_name,
                    "start for a game already pending"
                );
                return false;
            }
            RecordStart::Replaced(previous) => {
                tracing::warn!(
                    member_id = %event.member_id,
                    game = %previous.game_name,
                    "dropping unfinished session replaced by a new game"
                );
            }
            RecordStart::Inserted => {}
        }
        tracing::info!(
            member_id = %event.member_id,
            member = %event.member_name,
            game = %activity.game_name,
            platform = %activity.platform,
            "member started playing"
        );
        true
    }

    fn stop(
        &self,
        event: &PresenceChanged,
        observation: &ActivityObservation,
        activity: CanonicalActivity,
        now: DateTime<Utc>,
    ) -> Result<StopOutcome, TrackerError> {
        let pending = self
            .pending
            .take_if_matching(&event.member_id, &activity.application_key);

        let Some(duration) = resolve_duration(&activity, observation.start(), pending.as_ref(), now)
        else {
            tracing::info!(
                member_id = %event.member_id,
                member = %event.member_name,
                game = %activity.game_name,
                "member stopped playing but no start time is known, dropping session"
            );
            return Ok(StopOutcome::Unresolved(activity));
        };

        let completed = CompletedSession {
            member_id: event.member_id.clone(),
            member_name: event.member_name.clone(),
            game_name: activity.game_name,
            platform: activity.platform,
            seconds: duration.seconds,
            occurred_at: now,
            source: duration.source,
        };
        tracing::info!(
            member_id = %completed.member_id,
            member = %completed.member_name,
            game = %completed.game_name,
            seconds = completed.seconds,
            source = duration.source.as_str(),
            "member stopped playing"
        );
        self.persist(&completed)?;
        Ok(StopOutcome::Completed(completed))
    }

    fn persist(&self, session: &CompletedSession) -> Result<(), TrackerError> {
        let persistence = |source: S::Error| TrackerError::Persistence {
            member_id: session.member_id.clone(),
            source: Box::new(source),
        };

        let (user, user_created) = self
            .store
            .ensure_user(&session.member_id, &session.member_name)
            .map_err(persistence)?;
        if user_created {
            tracing::info!(member_id = %user.id, name = %user.name, "added new user");
        }

        let (game, game_created) = self
            .store
            .ensure_game(&session.game_name)
            .map_err(persistence)?;
        if game_created {
            tracing::info!(game = %game.name, "added new game");
        }

        self.store
            .record_activity(
                &user,
                &game,
                session.seconds,
                &session.platform,
                session.occurred_at,
            )
            .map_err(persistence)
    }
}
