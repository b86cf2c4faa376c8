use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::object::StagedObject;

pub mod memory;

pub use memory::{InMemoryExpiringStore, InMemoryObjectStore};

/// One row of an expiring namespace (mutex table, url table).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiringRecord {
    pub namespace: String,
    pub id: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ExpiringRecord {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Key-value namespace where every record carries an absolute expiry.
///
/// Expired records are invisible to readers and count as absent for
/// `put_if_absent` whether or not `purge_expired` has removed them yet.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    fn namespace(&self) -> &str;

    /// Inserts `id` only when no live record holds it. Atomic per id.
    async fn put_if_absent(
        &self,
        id: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PutOutcome, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ExpiringRecord>, StoreError>;

    /// Physically removes expired rows and returns how many went away.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_if_absent(&self, object: StagedObject) -> Result<PutOutcome, StoreError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StagedObject>, StoreError>;

    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// Key rules shared by every store implementation.
pub fn validate_key(id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidKey("key must not be blank".to_string()));
    }
    if id.len() > 512 {
        return Err(StoreError::InvalidKey(format!("key is {} bytes, limit is 512", id.len())));
    }
    Ok(())
}
