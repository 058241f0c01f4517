//! Session duration resolution with graceful degradation.

use chrono::{DateTime, Utc};

use crate::activity::CanonicalActivity;
use crate::pending::PendingSession;

/// Where the start time of a resolved duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationSource {
    /// Start time reported on the stop snapshot itself.
    Observed,
    /// Start time reported upstream when the session started.
    PendingObserved,
    /// Our own first sighting of the session.
    PendingFirstSeen,
}

impl DurationSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Observed => "observed",
            Self::PendingObserved => "pending_observed",
            Self::PendingFirstSeen => "pending_first_seen",
        }
    }
}

/// A session length in whole seconds, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDuration {
    pub seconds: i64,
    pub source: DurationSource,
}

/// Computes how long `activity` was played, if any start time is known.
///
/// The stop snapshot's own start time wins; otherwise a pending session for
/// the same application key supplies one. Returns `None` when neither path
/// yields a start. Durations are rounded to the nearest second and clock skew
/// is clamped to zero.
pub fn resolve_duration(
    activity: &CanonicalActivity,
    observed_start: Option<DateTime<Utc>>,
    pending: Option<&PendingSession>,
    now: DateTime<Utc>,
) -> Option<ResolvedDuration> {
    let (start, source) = match (observed_start, pending) {
        (Some(start), _) => (start, DurationSource::Observed),
        (None, Some(pending)) if pending.application_key == activity.application_key => {
            let source = if pending.observed_start.is_some() {
                DurationSource::PendingObserved
            } else {
                DurationSource::PendingFirstSeen
            };
            (pending.effective_start(), source)
        }
        (None, _) => return None,
    };

    Some(ResolvedDuration {
        seconds: rounded_seconds(activity, start, now),
        source,
    })
}

fn rounded_seconds(activity: &CanonicalActivity, start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_ms = now.signed_duration_since(start).num_milliseconds();
    if elapsed_ms < 0 {
        tracing::warn!(
            game = %activity.game_name,
            %start,
            %now,
            "session start is after its stop, clamping duration to zero"
        );
        return 0;
    }
    (elapsed_ms + 500) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityObservation, normalize};
    use chrono::{Duration, TimeZone};

    fn hades() -> CanonicalActivity {
        normalize(&ActivityObservation::playing("Hades").unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn pending(activity: &CanonicalActivity, observed_start: Option<DateTime<Utc>>) -> PendingSession {
        PendingSession {
            application_key: activity.application_key.clone(),
            game_name: activity.game_name.clone(),
            observed_start,
            first_seen_at: t0(),
        }
    }

    #[test]
    fn observed_start_wins_over_pending() {
        let activity = hades();
        let cached = pending(&activity, None);
        let start = t0() + Duration::seconds(100);
        let now = t0() + Duration::seconds(700);

        let resolved = resolve_duration(&activity, Some(start), Some(&cached), now).unwrap();
        assert_eq!(resolved.seconds, 600);
        assert_eq!(resolved.source, DurationSource::Observed);
    }

    #[test]
    fn pending_upstream_start_preferred_over_first_seen() {
        let activity = hades();
        let cached = pending(&activity, Some(t0() - Duration::seconds(60)));
        let now = t0() + Duration::seconds(600);

        let resolved = resolve_duration(&activity, None, Some(&cached), now).unwrap();
        assert_eq!(resolved.seconds, 660);
        assert_eq!(resolved.source, DurationSource::PendingObserved);
    }

    #[test]
    fn pending_first_seen_is_last_resort() {
        let activity = hades();
        let cached = pending(&activity, None);
        let now = t0() + Duration::seconds(600);

        let resolved = resolve_duration(&activity, None, Some(&cached), now).unwrap();
        assert_eq!(resolved.seconds, 600);
        assert_eq!(resolved.source, DurationSource::PendingFirstSeen);
    }

    #[test]
    fn mismatched_pending_is_ignored() {
        let celeste = normalize(&ActivityObservation::playing("Celeste").unwrap());
        let cached = pending(&celeste, None);

        assert!(resolve_duration(&hades(), None, Some(&cached), t0()).is_none());
    }

    #[test]
    fn no_timing_data_is_unresolvable() {
        assert!(resolve_duration(&hades(), None, None, t0()).is_none());
    }

    #[test]
    fn rounds_to_nearest_second() {
        let activity = hades();
        let down = t0() + Duration::milliseconds(10_499);
        let up = t0() + Duration::milliseconds(10_500);

        assert_eq!(resolve_duration(&activity, Some(t0()), None, down).unwrap().seconds, 10);
        assert_eq!(resolve_duration(&activity, Some(t0()), None, up).unwrap().seconds, 11);
    }

    #[test]
    fn clock_skew_clamps_to_zero() {
        let start = t0() + Duration::seconds(30);
        let resolved = resolve_duration(&hades(), Some(start), None, t0()).unwrap();
        assert_eq!(resolved.seconds, 0);
    }
}
