//! Background job: compact the revocation blacklist.
//!
//! A force-delete records an all-wildcard entry that shadows every entry
//! recorded at or before it. Those shadowed entries can never change a
//! lookup result, so they are dropped and the table stays small.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::errors::Result;
use crate::store::SqlStore;

/// Spawn the compaction loop. The first pass runs immediately.
pub fn spawn(store: SqlStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = run_once(&store).await {
                tracing::error!("blacklist compaction failed: {}", e);
            }
        }
    })
}

/// One compaction pass. Returns the number of entries removed.
pub async fn run_once(store: &SqlStore) -> Result<u64> {
    let removed = store.compact_blacklist().await?;
    if removed > 0 {
        tracing::info!(rows = removed, "compacted token blacklist");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blacklist::NewBlacklistEntry;
    use crate::store::Tables;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[tokio::test]
    async fn test_run_once_drops_shadowed_entries() {
        let store = SqlStore::in_memory(Tables::default()).await.unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        {
            let mut conn = store.pool().acquire().await.unwrap();
            let by_uuid = NewBlacklistEntry {
                uuid: Some("a".into()),
                ..Default::default()
            };
            store
                .insert_blacklist_entry(&mut conn, &by_uuid, start)
                .await
                .unwrap();
            store
                .insert_blacklist_entry(
                    &mut conn,
                    &NewBlacklistEntry::wildcard(),
                    start + ChronoDuration::seconds(1),
                )
                .await
                .unwrap();
        }

        assert_eq!(run_once(&store).await.unwrap(), 1);
        assert_eq!(run_once(&store).await.unwrap(), 0);
        assert_eq!(store.list_blacklist_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_job_compacts() {
        let store = SqlStore::in_memory(Tables::default()).await.unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        {
            let mut conn = store.pool().acquire().await.unwrap();
            for _ in 0..3 {
                store
                    .insert_blacklist_entry(&mut conn, &NewBlacklistEntry::wildcard(), now)
                    .await
                    .unwrap();
            }
        }

        let handle = spawn(store.clone(), Duration::from_secs(3600));
        for _ in 0..50 {
            if store.list_blacklist_entries().await.unwrap().len() == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(store.list_blacklist_entries().await.unwrap().len(), 1);
    }
}
