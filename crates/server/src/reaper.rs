use std::sync::Arc;
use std::time::Duration;

use hitter_core::store::{ExpiringStore, ObjectStore, StoreError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Deletes rows that readers already treat as absent. Nothing depends on it running.
#[derive(Clone)]
pub struct Reaper {
    interval: Duration,
    namespaces: Vec<Arc<dyn ExpiringStore>>,
    objects: Vec<Arc<dyn ObjectStore>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub records_removed: u64,
    pub objects_removed: u64,
    pub failures: usize,
}

impl Reaper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            namespaces: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, store: Arc<dyn ExpiringStore>) -> Self {
        self.namespaces.push(store);
        self
    }

    pub fn with_objects(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.objects.push(store);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run_once(&self) -> ReapReport {
        let mut report = ReapReport::default();

        for store in &self.namespaces {
            match store.purge_expired().await {
                Ok(removed) => {
                    report.records_removed += removed;
                    debug!(
                        event_name = "reaper.namespace_purged",
                        namespace = %store.namespace(),
                        removed,
                        "expired records purged"
                    );
                }
                Err(error) => {
                    report.failures += 1;
                    log_failure(store.namespace(), &error);
                }
            }
        }

        for store in &self.objects {
            match store.purge_expired().await {
                Ok(removed) => report.objects_removed += removed,
                Err(error) => {
                    report.failures += 1;
                    log_failure("objects", &error);
                }
            }
        }

        report
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(
                event_name = "reaper.started",
                correlation_id = "bootstrap",
                interval_secs = self.interval().as_secs(),
                "reaper started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        if report.records_removed > 0 || report.objects_removed > 0 {
                            info!(
                                event_name = "reaper.sweep_completed",
                                records_removed = report.records_removed,
                                objects_removed = report.objects_removed,
                                failures = report.failures,
                                "expired rows purged"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(event_name = "reaper.stopped", correlation_id = "shutdown", "reaper stopped");
        })
    }
}

fn log_failure(target: &str, error: &StoreError) {
    warn!(
        event_name = "reaper.purge_failed",
        store = %target,
        error = %error,
        "purge failed, retrying next sweep"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use hitter_core::store::{ExpiringRecord, ExpiringStore, PutOutcome, StoreError};
    use hitter_core::{Clock, InMemoryExpiringStore, ManualClock};
    use tokio::sync::watch;

    use super::{ReapReport, Reaper};

    struct BrokenStore;

    #[async_trait]
    impl ExpiringStore for BrokenStore {
        fn namespace(&self) -> &str {
            "broken"
        }

        async fn put_if_absent(
            &self,
            _id: &str,
            _value: &str,
            _expires_at: DateTime<Utc>,
        ) -> Result<PutOutcome, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn get(&self, _id: &str) -> Result<Option<ExpiringRecord>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn purge_expired(&self) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryExpiringStore::with_clock("hitter-url", shared));

        store
            .put_if_absent("old", "https://a.example", start + chrono::Duration::minutes(5))
            .await
            .expect("put");
        store
            .put_if_absent("new", "https://b.example", start + chrono::Duration::days(3))
            .await
            .expect("put");
        clock.advance(Duration::from_secs(3600));

        let reaper = Reaper::new(Duration::from_secs(60)).with_namespace(store.clone());
        let report = reaper.run_once().await;

        assert_eq!(report, ReapReport { records_removed: 1, objects_removed: 0, failures: 0 });
        assert!(store.get("new").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn failing_store_does_not_stop_other_sweeps() {
        let store = Arc::new(InMemoryExpiringStore::new("hitter-mutex"));
        let reaper = Reaper::new(Duration::from_secs(60))
            .with_namespace(Arc::new(BrokenStore))
            .with_namespace(store);

        let report = reaper.run_once().await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.records_removed, 0);
    }

    #[tokio::test]
    async fn spawned_reaper_stops_on_shutdown() {
        let (sender, receiver) = watch::channel(false);
        let handle = Reaper::new(Duration::from_secs(3600)).spawn(receiver);

        sender.send(true).expect("signal shutdown");
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reaper should stop")
            .expect("task should not panic");
    }

    #[test]
    fn zero_interval_is_clamped() {
        assert_eq!(Reaper::new(Duration::ZERO).interval(), Duration::from_secs(1));
    }
}
