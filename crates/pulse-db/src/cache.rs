use crate::handle::DbHandle;
use crate::util::{from_rfc3339, sql_err, to_rfc3339};
use chrono::{DateTime, Duration, Utc};
use pulse_core::error::StoreError;

/// Expiring key/blob store for supplementary event copies.
#[derive(Clone)]
pub struct BlobCache {
    handle: DbHandle,
}

impl BlobCache {
    pub fn new(handle: DbHandle) -> Self {
        Self { handle }
    }

    pub async fn put(&self, key: &str, body: &str, ttl: Duration) -> Result<(), StoreError> {
        let created_at = Utc::now();
        let expires_at = created_at + ttl;
        let conn = self.handle.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, body, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            (key, body, to_rfc3339(&created_at), to_rfc3339(&expires_at)),
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Returns the blob unless it is absent or already expired; an expired
    /// entry is dropped on the way out.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.handle.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT body, expires_at FROM cache_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;
        let Some((body, expires_at)) = row else {
            return Ok(None);
        };
        if from_rfc3339(&expires_at)? < Utc::now() {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])
                .map_err(sql_err)?;
            return Ok(None);
        }
        Ok(Some(body))
    }

    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.handle.lock().await;
        let affected = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at < ?1",
                [to_rfc3339(&now)],
            )
            .map_err(sql_err)?;
        Ok(affected as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> BlobCache {
        BlobCache::new(DbHandle::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let cache = cache();
        cache
            .put("event:evt_1", r#"{"id":"evt_1"}"#, Duration::days(7))
            .await
            .unwrap();
        let body = cache.get("event:evt_1").await.unwrap();
        assert_eq!(body.as_deref(), Some(r#"{"id":"evt_1"}"#));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_none() {
        let cache = cache();
        cache
            .put("event:evt_1", "{}", Duration::seconds(-1))
            .await
            .unwrap();
        assert!(cache.get("event:evt_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_rows() {
        let cache = cache();
        cache.put("stale", "{}", Duration::seconds(-1)).await.unwrap();
        cache.put("fresh", "{}", Duration::days(1)).await.unwrap();

        let removed = cache.cleanup(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("fresh").await.unwrap().is_some());
    }
}
