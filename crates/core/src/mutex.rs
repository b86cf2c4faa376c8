use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::lock::LockRecord;
use crate::store::{validate_key, ExpiringStore, PutOutcome, StoreError};
use crate::time::{add_duration, Clock, SystemClock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acquisition {
    Acquired { expires_at: DateTime<Utc> },
    Duplicate,
}

impl Acquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }
}

/// Guarantees at-most-once processing per delivery id.
///
/// A claim lives until its hold duration elapses. There is no release, so a
/// retried delivery inside the hold window is always reported as a duplicate.
#[derive(Clone)]
pub struct MutexCoordinator {
    store: Arc<dyn ExpiringStore>,
    clock: Arc<dyn Clock>,
    default_hold: Duration,
    holder: String,
}

impl MutexCoordinator {
    pub fn new(store: Arc<dyn ExpiringStore>, default_hold: Duration) -> Self {
        Self::with_clock(store, default_hold, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ExpiringStore>,
        default_hold: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, clock, default_hold, holder: format!("hitter-{}", std::process::id()) }
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn default_hold(&self) -> Duration {
        self.default_hold
    }

    pub async fn try_acquire(
        &self,
        event_id: &str,
        hold: Duration,
    ) -> Result<Acquisition, StoreError> {
        validate_key(event_id)?;

        let expires_at = add_duration(self.clock.now(), hold);
        let outcome = self.store.put_if_absent(event_id, &self.holder, expires_at).await?;

        match outcome {
            PutOutcome::Created => {
                debug!(
                    event_name = "mutex.acquired",
                    correlation_id = %event_id,
                    namespace = %self.store.namespace(),
                    expires_at = %expires_at,
                    "claimed delivery id"
                );
                Ok(Acquisition::Acquired { expires_at })
            }
            PutOutcome::AlreadyExists => {
                debug!(
                    event_name = "mutex.duplicate",
                    correlation_id = %event_id,
                    namespace = %self.store.namespace(),
                    "delivery id already claimed"
                );
                Ok(Acquisition::Duplicate)
            }
        }
    }

    pub async fn try_acquire_default(&self, event_id: &str) -> Result<Acquisition, StoreError> {
        self.try_acquire(event_id, self.default_hold).await
    }

    pub async fn current(&self, event_id: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.store.get(event_id).await?.map(LockRecord::from))
    }
}
