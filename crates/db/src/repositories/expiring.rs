use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use hitter_core::store::{validate_key, ExpiringRecord, ExpiringStore, PutOutcome, StoreError};
use hitter_core::time::{Clock, SystemClock};

use super::{parse_millis, RepositoryError};
use crate::DbPool;

/// SQLite backed expiring namespace. Rows of all namespaces share `expiring_record`.
pub struct SqlExpiringStore {
    pool: DbPool,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl SqlExpiringStore {
    pub fn new(pool: DbPool, namespace: impl Into<String>) -> Self {
        Self::with_clock(pool, namespace, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: DbPool, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, namespace: namespace.into(), clock }
    }

    /// Rows held for this namespace whether live or expired.
    pub async fn physical_len(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM expiring_record WHERE namespace = ?")
                .bind(&self.namespace)
                .fetch_one(&self.pool)
                .await?;
        super::parse_u64("count", count)
    }

    async fn insert_or_reclaim(
        &self,
        id: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PutOutcome, RepositoryError> {
        let now = self.clock.now().timestamp_millis();

        // A single statement keeps the claim atomic. The conflict branch only
        // fires for rows that are already expired, which lets a stale claim be
        // taken over without a separate read.
        let result = sqlx::query(
            "INSERT INTO expiring_record (namespace, id, value, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(namespace, id) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
             WHERE expiring_record.expires_at <= excluded.created_at",
        )
        .bind(&self.namespace)
        .bind(id)
        .bind(value)
        .bind(now)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 { PutOutcome::Created } else { PutOutcome::AlreadyExists })
    }

    async fn find_live(&self, id: &str) -> Result<Option<ExpiringRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT namespace, id, value, created_at, expires_at
             FROM expiring_record
             WHERE namespace = ? AND id = ? AND expires_at > ?",
        )
        .bind(&self.namespace)
        .bind(id)
        .bind(self.clock.now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn delete_expired(&self) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM expiring_record WHERE namespace = ? AND expires_at <= ?")
                .bind(&self.namespace)
                .bind(self.clock.now().timestamp_millis())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ExpiringStore for SqlExpiringStore {
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
        Ok(self.insert_or_reclaim(id, value, expires_at).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<ExpiringRecord>, StoreError> {
        Ok(self.find_live(id).await?)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(self.delete_expired().await?)
    }
}

fn record_from_row(row: SqliteRow) -> Result<ExpiringRecord, RepositoryError> {
    Ok(ExpiringRecord {
        namespace: row.try_get("namespace")?,
        id: row.try_get("id")?,
        value: row.try_get("value")?,
        created_at: parse_millis("created_at", row.try_get("created_at")?)?,
        expires_at: parse_millis("expires_at", row.try_get("expires_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use hitter_core::store::{ExpiringStore, PutOutcome, StoreError};
    use hitter_core::time::{Clock, ManualClock};

    use super::SqlExpiringStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("valid start"))
    }

    #[tokio::test]
    async fn keys_follow_the_shared_length_rules() {
        let pool = setup_pool().await;
        let clock = clock();
        let store = SqlExpiringStore::with_clock(pool.clone(), "mutex", Arc::new(clock.clone()));
        let expires_at = clock.now() + chrono::Duration::hours(1);

        for key in ["  ".to_string(), "k".repeat(513)] {
            let error = store.put_if_absent(&key, "v", expires_at).await.expect_err("invalid key");
            assert!(matches!(error, StoreError::InvalidKey(_)));
        }
        assert_eq!(
            store.put_if_absent(&"k".repeat(512), "v", expires_at).await.expect("limit"),
            PutOutcome::Created
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn conditional_insert_reports_existing_live_row() {
        let pool = setup_pool().await;
        let clock = clock();
        let store = SqlExpiringStore::with_clock(pool.clone(), "mutex", Arc::new(clock.clone()));
        let expires_at = clock.now() + chrono::Duration::hours(24);

        assert_eq!(
            store.put_if_absent("evt-42", "a", expires_at).await.expect("first"),
            PutOutcome::Created
        );
        assert_eq!(
            store.put_if_absent("evt-42", "b", expires_at).await.expect("second"),
            PutOutcome::AlreadyExists
        );
        let record = store.get("evt-42").await.expect("get").expect("record");
        assert_eq!(record.value, "a");
        assert_eq!(record.expires_at, expires_at);

        pool.close().await;
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let pool = setup_pool().await;
        let mutex = SqlExpiringStore::new(pool.clone(), "mutex");
        let urls = SqlExpiringStore::new(pool.clone(), "url");
        let expires_at = Utc::now() + chrono::Duration::hours(1);

        assert_eq!(mutex.put_if_absent("same", "a", expires_at).await.expect("mutex"), PutOutcome::Created);
        assert_eq!(urls.put_if_absent("same", "b", expires_at).await.expect("url"), PutOutcome::Created);

        pool.close().await;
    }

    #[tokio::test]
    async fn expired_row_is_hidden_then_reclaimed_then_purged() {
        let pool = setup_pool().await;
        let clock = clock();
        let store = SqlExpiringStore::with_clock(pool.clone(), "url", Arc::new(clock.clone()));
        store
            .put_if_absent("aB3dF", "https://example.com", clock.now() + chrono::Duration::seconds(30))
            .await
            .expect("put");

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.get("aB3dF").await.expect("get"), None);
        assert_eq!(store.physical_len().await.expect("len"), 1);

        let reclaimed = store
            .put_if_absent("aB3dF", "https://new.example.com", clock.now() + chrono::Duration::hours(1))
            .await
            .expect("reclaim");
        assert_eq!(reclaimed, PutOutcome::Created);
        let record = store.get("aB3dF").await.expect("get").expect("record");
        assert_eq!(record.value, "https://new.example.com");

        store
            .put_if_absent("old", "v", clock.now() + chrono::Duration::seconds(1))
            .await
            .expect("put old");
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
        assert_eq!(store.physical_len().await.expect("len"), 1);

        pool.close().await;
    }
}
