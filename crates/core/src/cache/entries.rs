//! SQLite implementation of [`StoreBackend`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::store::{CacheEntry, StoreBackend};
use crate::Error;

#[async_trait]
impl StoreBackend for CacheDb {
    async fn create_namespace(&self, namespace: &str) -> Result<(), Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, method, url, status, headers_json, payload, cached_at
                     FROM entries WHERE namespace = ?1 AND key = ?2",
                )?;

                let row = stmt.query_row(params![namespace, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                });

                let (key, method, url, status, headers_json, payload, cached_at) = match row {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let headers = serde_json::from_str(&headers_json)?;
                let cached_at = DateTime::from_timestamp_millis(cached_at)
                    .ok_or_else(|| Error::CorruptEntry(format!("cached_at out of range: {cached_at}")))?;

                Ok(Some(CacheEntry { key, method, url, status, headers, payload, cached_at }))
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
        let namespace = namespace.to_string();
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, Utc::now().to_rfc3339()],
                )?;
                tx.execute(
                    "INSERT INTO entries (namespace, key, method, url, status, headers_json, payload, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(namespace, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        payload = excluded.payload,
                        cached_at = excluded.cached_at",
                    params![
                        namespace,
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.status,
                        headers_json,
                        &entry.payload,
                        entry.cached_at.timestamp_millis(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, Error> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("DELETE FROM entries WHERE namespace = ?1 AND key = ?2", params![namespace, key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![namespace])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn usage_bytes(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let total: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(payload) + LENGTH(headers_json) + LENGTH(key) + LENGTH(url)), 0)
                     FROM entries",
                    [],
                    |row| row.get(0),
                )?;
                Ok(total.max(0) as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::Store;
    use std::sync::Arc;

    fn make_entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry::new(
            "GET",
            url,
            200,
            vec![("content-type".to_string(), "application/json".to_string())],
            body.as_bytes().to_vec(),
            DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://example.com/api/items", "[1,2]");

        db.put("app-api-v1", &entry).await.unwrap();

        let retrieved = db.get("app-api-v1", &entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved, entry);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("app-api-v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("ns", &make_entry("https://example.com/a", "old")).await.unwrap();
        db.put("ns", &make_entry("https://example.com/a", "new")).await.unwrap();

        let key = make_entry("https://example.com/a", "").key;
        let entry = db.get("ns", &key).await.unwrap().unwrap();
        assert_eq!(entry.payload, b"new");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://example.com/a", "x");
        db.put("one", &entry).await.unwrap();

        assert!(db.get("two", &entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_namespace_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://example.com/a", "x");
        db.put("old", &entry).await.unwrap();
        db.put("keep", &entry).await.unwrap();

        assert!(db.delete_namespace("old").await.unwrap());
        assert!(!db.delete_namespace("old").await.unwrap());

        assert_eq!(db.list_namespaces().await.unwrap(), vec!["keep".to_string()]);
        assert!(db.get("old", &entry.key).await.unwrap().is_none());
        assert!(db.get("keep", &entry.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_handle_roundtrip() {
        let db: Arc<dyn StoreBackend> = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let store = Store::open(db.clone(), "app-static-v1").await.unwrap();
        assert_eq!(db.list_namespaces().await.unwrap(), vec!["app-static-v1".to_string()]);

        let entry = make_entry("https://example.com/", "<html></html>");
        store.put(&entry).await.unwrap();
        assert!(store.get(&entry.key).await.unwrap().is_some());
        assert!(store.delete(&entry.key).await.unwrap());
        assert!(store.get(&entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_usage_bytes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.usage_bytes().await.unwrap(), 0);

        db.put("ns", &make_entry("https://example.com/a", "0123456789")).await.unwrap();
        let usage = db.usage_bytes().await.unwrap();
        assert!(usage >= 10);
    }
}
