use std::sync::Arc;

use crate::commands::{load_config, runtime, CommandResult};
use hitter_core::store::{ExpiringStore, ObjectStore};
use hitter_db::{connect_with_settings, migrations, SqlExpiringStore, SqlObjectStore};
use serde_json::json;

/// One-off version of the server's background reaper.
pub fn run() -> CommandResult {
    let config = match load_config("purge") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("purge") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let namespaces: [Arc<dyn ExpiringStore>; 2] = [
            Arc::new(SqlExpiringStore::new(pool.clone(), &config.storage.mutex_table)),
            Arc::new(SqlExpiringStore::new(pool.clone(), &config.storage.url_table)),
        ];
        let mut removed = serde_json::Map::new();
        for store in &namespaces {
            let count = store
                .purge_expired()
                .await
                .map_err(|error| ("storage", error.to_string(), 6u8))?;
            removed.insert(store.namespace().to_string(), json!(count));
        }
        let objects = SqlObjectStore::new(pool.clone())
            .purge_expired()
            .await
            .map_err(|error| ("storage", error.to_string(), 6u8))?;
        removed.insert(config.storage.bucket.clone(), json!(objects));

        pool.close().await;
        Ok::<serde_json::Map<String, serde_json::Value>, (&'static str, String, u8)>(removed)
    });

    match result {
        Ok(removed) => {
            let total: u64 = removed.values().filter_map(serde_json::Value::as_u64).sum();
            CommandResult::success_with_details(
                "purge",
                format!("removed {total} expired row(s)"),
                Some(json!({ "removed": removed })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("purge", error_class, message, exit_code)
        }
    }
}
