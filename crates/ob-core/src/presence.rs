//! Presence-changed events and transition classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityObservation, CanonicalActivity};
use crate::types::MemberId;

/// A member's activity list changed.
///
/// Delivered at most once per actual change and in order per member; no
/// replay is expected after a reconnect, so gaps are tolerated silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceChanged {
    pub member_id: MemberId,
    pub member_name: String,
    /// When the change was observed. Defaults to receipt time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub before: Vec<ActivityObservation>,
    #[serde(default)]
    pub after: Vec<ActivityObservation>,
}

impl PresenceChanged {
    /// The playing activity before the change, if any.
    pub fn playing_before(&self) -> Option<&ActivityObservation> {
        extract_playing_activity(&self.before)
    }

    /// The playing activity after the change, if any.
    pub fn playing_after(&self) -> Option<&ActivityObservation> {
        extract_playing_activity(&self.after)
    }
}

/// Returns the first "playing" activity in upstream order.
///
/// A member is modeled as playing at most one game at a time.
pub fn extract_playing_activity(activities: &[ActivityObservation]) -> Option<&ActivityObservation> {
    activities.iter().find(|activity| activity.kind().is_playing())
}

/// How a member's playing state moved between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Nothing relevant changed.
    Unchanged,
    /// Started playing after not playing.
    Started,
    /// Stopped playing.
    Stopped,
    /// Was playing one game, now playing another.
    Switched,
}

/// Classifies a transition on canonical activities.
///
/// Comparing after normalization keeps cosmetic differences (details text,
/// platform spelling) from registering as a new session.
pub fn classify(before: Option<&CanonicalActivity>, after: Option<&CanonicalActivity>) -> Transition {
    match (before, after) {
        (None, None) => Transition::Unchanged,
        (Some(_), None) => Transition::Stopped,
        (None, Some(_)) => Transition::Started,
        (Some(before), Some(after)) if before.same_session(after) => Transition::Unchanged,
        (Some(_), Some(_)) => Transition::Switched,
    }
}
