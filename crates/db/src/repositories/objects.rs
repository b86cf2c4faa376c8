use std::sync::Arc;

use sqlx::{sqlite::SqliteRow, Row};

use hitter_core::domain::object::{ObjectKey, StagedObject};
use hitter_core::store::{validate_key, ObjectStore, PutOutcome, StoreError};
use hitter_core::time::{Clock, SystemClock};

use super::{parse_millis, parse_u64, RepositoryError};
use crate::DbPool;

pub struct SqlObjectStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqlObjectStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn insert(&self, object: StagedObject) -> Result<PutOutcome, RepositoryError> {
        let size_bytes = i64::try_from(object.size_bytes)
            .map_err(|_| RepositoryError::Decode("object size exceeds i64".to_string()))?;

        let result = sqlx::query(
            "INSERT INTO staged_object (
                bucket, object_key, file_name, content_type, content_digest,
                size_bytes, body, created_at, expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(bucket, object_key) DO UPDATE SET
                file_name = excluded.file_name,
                content_type = excluded.content_type,
                content_digest = excluded.content_digest,
                size_bytes = excluded.size_bytes,
                body = excluded.body,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
             WHERE staged_object.expires_at <= ?",
        )
        .bind(&object.bucket)
        .bind(&object.key.0)
        .bind(&object.file_name)
        .bind(&object.content_type)
        .bind(&object.content_digest)
        .bind(size_bytes)
        .bind(&object.bytes)
        .bind(object.created_at.timestamp_millis())
        .bind(object.expires_at.timestamp_millis())
        .bind(self.clock.now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 { PutOutcome::Created } else { PutOutcome::AlreadyExists })
    }

    async fn find_live(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<StagedObject>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                bucket,
                object_key,
                file_name,
                content_type,
                content_digest,
                size_bytes,
                body,
                created_at,
                expires_at
             FROM staged_object
             WHERE bucket = ? AND object_key = ? AND expires_at > ?",
        )
        .bind(bucket)
        .bind(key)
        .bind(self.clock.now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(object_from_row).transpose()
    }

    async fn delete_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM staged_object WHERE expires_at <= ?")
            .bind(self.clock.now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ObjectStore for SqlObjectStore {
    async fn put_if_absent(&self, object: StagedObject) -> Result<PutOutcome, StoreError> {
        validate_key(&object.key.0)?;
        Ok(self.insert(object).await?)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StagedObject>, StoreError> {
        Ok(self.find_live(bucket, key).await?)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(self.delete_expired().await?)
    }
}

fn object_from_row(row: SqliteRow) -> Result<StagedObject, RepositoryError> {
    Ok(StagedObject {
        bucket: row.try_get("bucket")?,
        key: ObjectKey(row.try_get("object_key")?),
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        content_digest: row.try_get("content_digest")?,
        size_bytes: parse_u64("size_bytes", row.try_get("size_bytes")?)?,
        bytes: row.try_get("body")?,
        created_at: parse_millis("created_at", row.try_get("created_at")?)?,
        expires_at: parse_millis("expires_at", row.try_get("expires_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use hitter_core::domain::object::{ObjectKey, StagedObject};
    use hitter_core::store::{ObjectStore, PutOutcome, StoreError};
    use hitter_core::time::{Clock, ManualClock};

    use super::SqlObjectStore;
    use crate::{connect_with_settings, migrations};

    fn sample(clock: &ManualClock, key: &str) -> StagedObject {
        StagedObject {
            bucket: "hitter-objects".to_string(),
            key: ObjectKey(key.to_string()),
            file_name: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            content_digest: "digest".to_string(),
            size_bytes: 5,
            bytes: b"hello".to_vec(),
            created_at: clock.now(),
            expires_at: clock.now() + chrono::Duration::days(2),
        }
    }

    #[tokio::test]
    async fn staged_object_round_trips_until_retention_elapses() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("valid start"),
        );
        let store = SqlObjectStore::with_clock(pool.clone(), Arc::new(clock.clone()));
        let object = sample(&clock, "k1");

        assert_eq!(store.put_if_absent(object.clone()).await.expect("put"), PutOutcome::Created);
        assert_eq!(
            store.put_if_absent(object.clone()).await.expect("put again"),
            PutOutcome::AlreadyExists
        );
        assert_eq!(store.get("hitter-objects", "k1").await.expect("get"), Some(object));
        assert_eq!(store.get("other-bucket", "k1").await.expect("get"), None);

        clock.advance(Duration::from_secs(2 * 24 * 60 * 60));
        assert_eq!(store.get("hitter-objects", "k1").await.expect("get"), None);
        assert_eq!(store.purge_expired().await.expect("purge"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn blank_object_keys_are_refused() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("valid start"),
        );
        let store = SqlObjectStore::with_clock(pool.clone(), Arc::new(clock.clone()));

        let error = store.put_if_absent(sample(&clock, " ")).await.expect_err("blank key");
        assert!(matches!(error, StoreError::InvalidKey(_)));

        pool.close().await;
    }
}
