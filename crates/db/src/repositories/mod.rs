use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use hitter_core::store::StoreError;

pub mod expiring;
pub mod objects;

pub use expiring::SqlExpiringStore;
pub use objects::SqlObjectStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

fn parse_millis(column: &str, value: i64) -> Result<DateTime<Utc>, RepositoryError> {
    Utc.timestamp_millis_opt(value)
        .single()
        .ok_or_else(|| RepositoryError::Decode(format!("invalid `{column}` timestamp `{value}`")))
}

fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative `{column}` value `{value}`")))
}
