//! In-flight sessions awaiting their stop transition.
//!
//! The cache exists to recover a start time when the event source omits one
//! on the stop snapshot. It holds at most one entry per member and has no
//! eviction: an entry lives until a matching stop consumes it or a new start
//! replaces it, so its size is bounded by the number of members playing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::activity::CanonicalActivity;
use crate::types::{ApplicationKey, MemberId};

/// A session that has started but not yet stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub application_key: ApplicationKey,
    pub game_name: String,
    /// Start time reported upstream when the session started.
    pub observed_start: Option<DateTime<Utc>>,
    /// When this process first saw the session.
    pub first_seen_at: DateTime<Utc>,
}

impl PendingSession {
    /// Best available start: upstream's, else our own first sighting.
    pub fn effective_start(&self) -> DateTime<Utc> {
        self.observed_start.unwrap_or(self.first_seen_at)
    }
}

/// Result of [`PendingSessionCache::record_start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStart {
    /// No entry existed for the member.
    Inserted,
    /// A different game was pending and has been dropped.
    Replaced(PendingSession),
    /// The same application key was already pending; nothing changed.
    AlreadyPending,
}

/// Process-wide map from member to their single pending session.
///
/// Constructed once and shared by handle. Each method is a single critical
/// section, so read-modify-write on one member's entry is atomic.
#[derive(Debug, Default)]
pub struct PendingSessionCache {
    entries: Mutex<HashMap<MemberId, PendingSession>>,
}

impl PendingSessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MemberId, PendingSession>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a session start for `member_id`.
    ///
    /// Redundant starts for the same application key are ignored so the
    /// fallback clock (`first_seen_at`) isn't reset.
    pub fn record_start(
        &self,
        member_id: &MemberId,
        activity: &CanonicalActivity,
        observed_start: Option<DateTime<Utc>>,
        observed_at: DateTime<Utc>,
    ) -> RecordStart {
        let mut entries = self.lock();
        if entries
            .get(member_id)
            .is_some_and(|pending| pending.application_key == activity.application_key)
        {
            return RecordStart::AlreadyPending;
        }

        let session = PendingSession {
            application_key: activity.application_key.clone(),
            game_name: activity.game_name.clone(),
            observed_start,
            first_seen_at: observed_at,
        };
        match entries.insert(member_id.clone(), session) {
            Some(previous) => RecordStart::Replaced(previous),
            None => RecordStart::Inserted,
        }
    }

    /// Removes and returns the member's entry only if it is for `key`.
    ///
    /// A mismatched entry is left in place, so a stale session can never
    /// supply the duration of an unrelated game.
    pub fn take_if_matching(
        &self,
        member_id: &MemberId,
        key: &ApplicationKey,
    ) -> Option<PendingSession> {
        let mut entries = self.lock();
        if entries
            .get(member_id)
            .is_some_and(|pending| &pending.application_key == key)
        {
            entries.remove(member_id)
        } else {
            None
        }
    }

    /// Returns a copy of the member's pending entry.
    pub fn get(&self, member_id: &MemberId) -> Option<PendingSession> {
        self.lock().get(member_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityObservation, normalize};
    use chrono::{Duration, TimeZone};

    fn member() -> MemberId {
        MemberId::new("80351110224678912").unwrap()
    }

    fn activity(name: &str) -> CanonicalActivity {
        normalize(&ActivityObservation::playing(name).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn record_start_inserts_then_ignores_redundant_start() {
        let cache = PendingSessionCache::new();
        let hades = activity("Hades");

        assert_eq!(
            cache.record_start(&member(), &hades, None, t0()),
            RecordStart::Inserted
        );
        assert_eq!(
            cache.record_start(&member(), &hades, None, t0() + Duration::seconds(30)),
            RecordStart::AlreadyPending
        );

        let pending = cache.get(&member()).unwrap();
        assert_eq!(pending.first_seen_at, t0());
    }

    #[test]
    fn record_start_replaces_different_game() {
        let cache = PendingSessionCache::new();
        cache.record_start(&member(), &activity("Hades"), None, t0());

        let result = cache.record_start(&member(), &activity("Celeste"), None, t0());
        let RecordStart::Replaced(previous) = result else {
            panic!("expected replacement, got {result:?}");
        };
        assert_eq!(previous.game_name, "Hades");
        assert_eq!(cache.get(&member()).unwrap().game_name, "Celeste");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn take_if_matching_consumes_entry() {
        let cache = PendingSessionCache::new();
        let hades = activity("Hades");
        cache.record_start(&member(), &hades, None, t0());

        let taken = cache.take_if_matching(&member(), &hades.application_key);
        assert_eq!(taken.map(|p| p.game_name), Some("Hades".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn take_if_matching_leaves_mismatched_entry() {
        let cache = PendingSessionCache::new();
        cache.record_start(&member(), &activity("Hades"), None, t0());

        let celeste = activity("Celeste");
        assert!(cache.take_if_matching(&member(), &celeste.application_key).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn members_are_independent() {
        let cache = PendingSessionCache::new();
        let other = MemberId::new("41771983423143937").unwrap();
        let hades = activity("Hades");
        cache.record_start(&member(), &hades, None, t0());
        cache.record_start(&other, &hades, None, t0());

        assert!(cache.take_if_matching(&other, &hades.application_key).is_some());
        assert!(cache.get(&member()).is_some());
    }

    #[test]
    fn effective_start_prefers_upstream_time() {
        let upstream = t0() - Duration::minutes(5);
        let pending = PendingSession {
            application_key: activity("Hades").application_key,
            game_name: "Hades".to_string(),
            observed_start: Some(upstream),
            first_seen_at: t0(),
        };
        assert_eq!(pending.effective_start(), upstream);

        let without = PendingSession {
            observed_start: None,
            ..pending
        };
        assert_eq!(without.effective_start(), t0());
    }
}
