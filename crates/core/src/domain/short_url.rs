use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::ExpiringRecord;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortUrlId(pub String);

impl std::fmt::Display for ShortUrlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    pub id: ShortUrlId,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<ExpiringRecord> for ShortUrlRecord {
    fn from(record: ExpiringRecord) -> Self {
        Self {
            id: ShortUrlId(record.id),
            long_url: record.value,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// What `shorten` hands back to callers: the record plus the public link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLink {
    pub id: ShortUrlId,
    pub long_url: String,
    pub short_url: String,
    pub expires_at: DateTime<Utc>,
}
