use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::ExpiringRecord;

/// A live claim on a delivery id in the mutex table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub event_id: String,
    pub holder: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<ExpiringRecord> for LockRecord {
    fn from(record: ExpiringRecord) -> Self {
        Self {
            event_id: record.id,
            holder: record.value,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}
