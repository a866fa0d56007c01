//! SQLite-backed durable attribution storage
//!
//! One `kv_store` table holds every visitor's durable keys, partitioned by
//! namespace (the visitor id).

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;
use xma_common::{KeyValueStore, Result};

/// Open (creating if needed) the database file and ensure the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_kv_store_table(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, for tests
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_kv_store_table(&pool).await?;
    Ok(pool)
}

async fn create_kv_store_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            version TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before versioned writes lack the column
    let has_version: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('kv_store') WHERE name = 'version'",
    )
    .fetch_one(pool)
    .await?;
    if has_version == 0 {
        sqlx::query("ALTER TABLE kv_store ADD COLUMN version TEXT")
            .execute(pool)
            .await?;
        info!("Added version column to kv_store");
    }
    Ok(())
}

fn updated_at() -> String {
    xma_common::time::to_rfc3339_millis(xma_common::time::now())
}

/// [`KeyValueStore`] over `kv_store`, scoped to one namespace
///
/// Conditional writes are single statements, so SQLite arbitrates between
/// concurrent requests on different pool connections.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE namespace = ? AND key = ?")
                .bind(&self.namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, version, updated_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                version = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .bind(updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, version, updated_at)
            VALUES (?, ?, ?, NULL, ?)
            ON CONFLICT(namespace, key) DO NOTHING
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .bind(updated_at())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_if_newer(&self, key: &str, value: &str, version: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, version, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                version = excluded.version,
                updated_at = excluded.updated_at
            WHERE kv_store.version IS NULL OR excluded.version >= kv_store.version
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .bind(version)
        .bind(updated_at())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteStore::new(pool, "visitor-1");

        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let pool = init_memory_database().await.unwrap();
        let store = SqliteStore::new(pool, "visitor-1");

        assert!(store.set_if_absent("first", "a").await.unwrap());
        assert!(!store.set_if_absent("first", "b").await.unwrap());
        assert_eq!(store.get("first").await.unwrap().as_deref(), Some("a"));

        assert!(store
            .set_if_newer("last", "later", "2025-01-01T00:00:01.000Z")
            .await
            .unwrap());
        assert!(!store
            .set_if_newer("last", "earlier", "2025-01-01T00:00:00.000Z")
            .await
            .unwrap());
        assert_eq!(store.get("last").await.unwrap().as_deref(), Some("later"));

        store.set("last", "plain").await.unwrap();
        assert!(store
            .set_if_newer("last", "any", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("xma.db")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = SqliteStore::new(pool.clone(), "visitor-1");
            handles.push(tokio::spawn(async move {
                store.set_if_absent("first", &i.to_string()).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_legacy_table_gains_version_column() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE kv_store (namespace TEXT NOT NULL, key TEXT NOT NULL, \
             value TEXT NOT NULL, updated_at TEXT NOT NULL, PRIMARY KEY (namespace, key))",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO kv_store VALUES ('v', 'k', 'old', '2024-01-01T00:00:00.000Z')")
            .execute(&pool)
            .await
            .unwrap();

        create_kv_store_table(&pool).await.unwrap();
        create_kv_store_table(&pool).await.unwrap();

        let store = SqliteStore::new(pool, "v");
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("old"));
        assert!(store
            .set_if_newer("k", "new", "2025-01-01T00:00:00.000Z")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let pool = init_memory_database().await.unwrap();
        let a = SqliteStore::new(pool.clone(), "a");
        let b = SqliteStore::new(pool, "b");

        a.set("xma_attribution", "{}").await.unwrap();
        assert_eq!(b.get("xma_attribution").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("xma.db");

        let pool = init_database(&path).await.unwrap();
        SqliteStore::new(pool.clone(), "v").set("k", "kept").await.unwrap();
        pool.close().await;

        let pool = init_database(&path).await.unwrap();
        assert_eq!(
            SqliteStore::new(pool, "v").get("k").await.unwrap().as_deref(),
            Some("kept")
        );
    }
}
