use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::object::StagedObject;
use crate::time::{Clock, SystemClock};

use super::{validate_key, ExpiringRecord, ExpiringStore, ObjectStore, PutOutcome, StoreError};

pub struct InMemoryExpiringStore {
    namespace: String,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<String, ExpiringRecord>>,
}

impl InMemoryExpiringStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_clock(namespace, Arc::new(SystemClock))
    }

    pub fn with_clock(namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { namespace: namespace.into(), clock, records: RwLock::new(HashMap::new()) }
    }

    /// Rows currently held, live or not. Used to check lazy expiry in tests.
    pub async fn physical_len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl ExpiringStore for InMemoryExpiringStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn put_if_absent(
        &self,
        id: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PutOutcome, StoreError> {
        validate_key(id)?;
        let now = self.clock.now();

        let mut records = self.records.write().await;
        if records.get(id).is_some_and(|existing| existing.is_live_at(now)) {
            return Ok(PutOutcome::AlreadyExists);
        }

        records.insert(
            id.to_string(),
            ExpiringRecord {
                namespace: self.namespace.clone(),
                id: id.to_string(),
                value: value.to_string(),
                created_at: now,
                expires_at,
            },
        );
        Ok(PutOutcome::Created)
    }

    async fn get(&self, id: &str) -> Result<Option<ExpiringRecord>, StoreError> {
        let now = self.clock.now();
        let records = self.records.read().await;
        Ok(records.get(id).filter(|record| record.is_live_at(now)).cloned())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_live_at(now));
        Ok((before - records.len()) as u64)
    }
}

pub struct InMemoryObjectStore {
    clock: Arc<dyn Clock>,
    objects: RwLock<HashMap<(String, String), StagedObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock, objects: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_if_absent(&self, object: StagedObject) -> Result<PutOutcome, StoreError> {
        validate_key(&object.key.0)?;
        let now = self.clock.now();
        let slot = (object.bucket.clone(), object.key.0.clone());

        let mut objects = self.objects.write().await;
        if objects.get(&slot).is_some_and(|existing| existing.is_live_at(now)) {
            return Ok(PutOutcome::AlreadyExists);
        }
        objects.insert(slot, object);
        Ok(PutOutcome::Created)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StagedObject>, StoreError> {
        let now = self.clock.now();
        let objects = self.objects.read().await;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .filter(|object| object.is_live_at(now))
            .cloned())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|_, object| object.is_live_at(now));
        Ok((before - objects.len()) as u64)
    }
}
