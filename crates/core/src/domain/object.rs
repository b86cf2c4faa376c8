use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey(pub String);

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedObject {
    pub bucket: String,
    pub key: ObjectKey,
    pub file_name: String,
    pub content_type: String,
    pub content_digest: String,
    pub size_bytes: u64,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StagedObject {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Read-only handle to a staged object. `url_expires_at` never exceeds `object_expires_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedObjectGrant {
    pub bucket: String,
    pub key: ObjectKey,
    pub file_name: String,
    pub size_bytes: u64,
    pub object_expires_at: DateTime<Utc>,
    pub url: String,
    pub url_expires_at: DateTime<Utc>,
}
