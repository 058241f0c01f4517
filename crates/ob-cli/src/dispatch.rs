//! Per-member partitioned dispatch of presence events.
//!
//! Every member hashes to exactly one partition, and each partition is a
//! blocking worker that drains its queue in order. Events for one member are
//! therefore handled strictly one after another, while different members
//! proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use ob_core::{
    ActivityStore, MemberId, PresenceChanged, SessionTracker, StopOutcome, TrackerOutcome,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events buffered per partition before `dispatch` waits.
const QUEUE_DEPTH: usize = 256;

/// Counts of what the workers did with their events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub handled: usize,
    pub started: usize,
    pub completed: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl DispatchStats {
    fn record(&mut self, outcome: &TrackerOutcome) {
        match outcome {
            TrackerOutcome::Unchanged | TrackerOutcome::AlreadyPlaying(_) => {}
            TrackerOutcome::Started(_) => self.started += 1,
            TrackerOutcome::Stopped(stop) => self.record_stop(stop),
            TrackerOutcome::Switched { previous, .. } => {
                self.started += 1;
                if let Some(stop) = previous {
                    self.record_stop(stop);
                }
            }
        }
    }

    const fn record_stop(&mut self, stop: &StopOutcome) {
        match stop {
            StopOutcome::Completed(_) => self.completed += 1,
            StopOutcome::Unresolved(_) => self.unresolved += 1,
        }
    }

    const fn merge(&mut self, other: Self) {
        self.handled += other.handled;
        self.started += other.started;
        self.completed += other.completed;
        self.unresolved += other.unresolved;
        self.failed += other.failed;
    }
}

/// Picks the partition that owns `member_id`.
#[allow(clippy::cast_possible_truncation)]
pub fn partition_for(member_id: &MemberId, partitions: usize) -> usize {
    let partitions = partitions.max(1);
    let mut hasher = DefaultHasher::new();
    member_id.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

/// Routes events to partition workers sharing one tracker.
pub struct Dispatcher {
    senders: Vec<mpsc::Sender<PresenceChanged>>,
    workers: Vec<JoinHandle<DispatchStats>>,
}

impl Dispatcher {
    /// Spawns `partitions` workers (at least one) on the current runtime.
    pub fn spawn<S>(tracker: &Arc<SessionTracker<S>>, partitions: usize) -> Self
    where
        S: ActivityStore + Send + Sync + 'static,
    {
        let partitions = partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            let tracker = Arc::clone(tracker);
            workers.push(tokio::task::spawn_blocking(move || {
                run_partition(partition, &tracker, rx)
            }));
            senders.push(tx);
        }
        tracing::debug!(partitions, "spawned dispatcher workers");
        Self { senders, workers }
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Queues an event on its member's partition.
    pub async fn dispatch(&self, event: PresenceChanged) -> Result<()> {
        let partition = partition_for(&event.member_id, self.senders.len());
        self.senders[partition]
            .send(event)
            .await
            .map_err(|_| anyhow!("dispatcher partition {partition} has stopped"))
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn finish(self) -> Result<DispatchStats> {
        drop(self.senders);
        let mut total = DispatchStats::default();
        for worker in self.workers {
            let stats = worker.await.context("dispatcher worker panicked")?;
            total.merge(stats);
        }
        Ok(total)
    }
}

/// Worker loop: blocks on the queue since the store is synchronous.
fn run_partition<S: ActivityStore>(
    partition: usize,
    tracker: &SessionTracker<S>,
    mut rx: mpsc::Receiver<PresenceChanged>,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    while let Some(event) = rx.blocking_recv() {
        stats.handled += 1;
        tracing::debug!(partition, member_id = %event.member_id, "handling presence event");
        match tracker.handle(&event) {
            Ok(outcome) => stats.record(&outcome),
            Err(err) => {
                stats.failed += 1;
                tracing::error!(
                    partition,
                    member_id = %event.member_id,
                    error = %err,
                    "failed to handle presence event"
                );
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ob_core::{ActivityObservation, PendingSessionCache, TrackerConfig};
    use ob_db::Database;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn event(
        member: &str,
        at: DateTime<Utc>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> PresenceChanged {
        let playing = |name: &str| vec![ActivityObservation::playing(name).unwrap()];
        PresenceChanged {
            member_id: MemberId::new(member).unwrap(),
            member_name: format!("member-{member}"),
            observed_at: Some(at),
            before: before.map(playing).unwrap_or_default(),
            after: after.map(playing).unwrap_or_default(),
        }
    }

    fn tracker() -> Arc<SessionTracker<Mutex<Database>>> {
        let db = Database::open_in_memory().unwrap();
        Arc::new(SessionTracker::new(
            Mutex::new(db),
            Arc::new(PendingSessionCache::new()),
            TrackerConfig::default(),
        ))
    }

    #[test]
    fn partition_is_stable_and_in_range() {
        let member = MemberId::new("80351110224678912").unwrap();
        let first = partition_for(&member, 4);
        assert!(first < 4);
        assert_eq!(partition_for(&member, 4), first);
        assert_eq!(partition_for(&member, 0), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sessions_for_many_members_are_recorded() {
        let tracker = tracker();
        let dispatcher = Dispatcher::spawn(&tracker, 3);
        assert_eq!(dispatcher.partitions(), 3);

        for member in ["1", "2", "3", "4", "5"] {
            dispatcher
                .dispatch(event(member, t0(), None, Some("Hades")))
                .await
                .unwrap();
            dispatcher
                .dispatch(event(
                    member,
                    t0() + Duration::seconds(600),
                    Some("Hades"),
                    None,
                ))
                .await
                .unwrap();
        }

        let stats = dispatcher.finish().await.unwrap();
        assert_eq!(
            stats,
            DispatchStats {
                handled: 10,
                started: 5,
                completed: 5,
                unresolved: 0,
                failed: 0,
            }
        );

        let db = tracker.store().lock().unwrap();
        let activities = db.list_activities().unwrap();
        assert_eq!(activities.len(), 5);
        assert!(activities.iter().all(|a| a.seconds == 600));
        assert!(tracker.pending().is_empty());
    }

    #[tokio::test]
    async fn stop_without_start_counts_as_unresolved() {
        let tracker = tracker();
        let dispatcher = Dispatcher::spawn(&tracker, 1);

        dispatcher
            .dispatch(event("1", t0(), Some("Hades"), None))
            .await
            .unwrap();
        dispatcher
            .dispatch(event("1", t0(), None, None))
            .await
            .unwrap();

        let stats = dispatcher.finish().await.unwrap();
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn replayed_start_is_not_counted_twice() {
        let tracker = tracker();
        let dispatcher = Dispatcher::spawn(&tracker, 1);

        for offset in [0, 30] {
            dispatcher
                .dispatch(event("1", t0() + Duration::seconds(offset), None, Some("Hades")))
                .await
                .unwrap();
        }

        let stats = dispatcher.finish().await.unwrap();
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.started, 1);
    }

    #[test]
    fn switched_outcome_counts_start_and_previous_stop() {
        let mut stats = DispatchStats::default();
        let activity = ob_core::normalize(&ActivityObservation::playing("Hades").unwrap());
        stats.record(&TrackerOutcome::Switched {
            previous: Some(StopOutcome::Unresolved(activity.clone())),
            started: activity,
        });
        assert_eq!(stats.started, 1);
        assert_eq!(stats.unresolved, 1);
    }
}
