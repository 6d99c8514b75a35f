use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use greenpact_db::Database;

/// Runs a blocking store call off the async workers and waits for it.
/// This is the only place a connection task suspends on the database.
pub async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("blocking store task failed: {}", e);
            anyhow::anyhow!("store task failed: {}", e)
        })?
}
