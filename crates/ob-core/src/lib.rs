//! Play-session tracking core.
//!
//! This crate turns presence-changed events into completed play sessions:
//! - Normalization: mapping raw activities to a canonical game/platform/key
//! - Classification: detecting start, stop and switch transitions
//! - Pending sessions: recovering start times the event source omits
//! - Duration resolution and hand-off to an [`ActivityStore`]

pub mod activity;
pub mod duration;
pub mod pending;
pub mod presence;
pub mod store;
pub mod tracker;
pub mod types;

pub use activity::{ActivityKind, ActivityObservation, CanonicalActivity, normalize};
pub use duration::{DurationSource, ResolvedDuration, resolve_duration};
pub use pending::{PendingSession, PendingSessionCache, RecordStart};
pub use presence::{PresenceChanged, Transition, classify, extract_playing_activity};
pub use store::{ActivityStore, Game, User};
pub use tracker::{
    CompletedSession, SessionTracker, StopOutcome, TrackerConfig, TrackerError, TrackerOutcome,
};
pub use types::{ApplicationKey, MemberId, ValidationError};
