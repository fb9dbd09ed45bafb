//! Durable persistence for the store snapshot.
//!
//! The [`SnapshotStore`] trait is the seam between the application store and
//! local storage: one namespaced key, one JSON payload. Two backends are
//! provided — [`SqliteSnapshotStore`] for real runs and
//! [`MemorySnapshotStore`] for tests and throwaway sessions.
//!
//! Corrupt payloads are a load-time concern only: a snapshot that fails to
//! deserialize is logged and treated as absent, so startup always succeeds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::config::StorageConfig;
use crate::store::Snapshot;

/// Abstract storage for the persisted state subset.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the snapshot stored under `namespace`, if any. Unreadable
    /// payloads count as absent.
    async fn load(&self, namespace: &str) -> Result<Option<Snapshot>>;

    /// Write the snapshot under `namespace`, replacing any previous one.
    async fn save(&self, namespace: &str, snapshot: &Snapshot) -> Result<()>;

    /// Drop the snapshot stored under `namespace`; no-op if absent.
    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// SQLite-backed snapshot storage: a single key/value table in a WAL-mode
/// database file.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Open (and if needed create) the database and ensure the schema
    /// exists. Idempotent.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let db_path = &config.path;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                namespace TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self, namespace: &str) -> Result<Option<Snapshot>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM snapshots WHERE namespace = ?")
                .bind(namespace)
                .fetch_optional(&self.pool)
                .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                tracing::warn!("persisted snapshot under '{namespace}' is unreadable, ignoring: {err}");
                Ok(None)
            }
        }
    }

    async fn save(&self, namespace: &str, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO snapshots (namespace, payload, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(namespace) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory snapshot storage. Payloads still round-trip through JSON so the
/// serialization path matches the SQLite backend.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, namespace: &str) -> Result<Option<Snapshot>> {
        let payload = {
            let map = self.inner.lock().expect("snapshot map poisoned");
            map.get(namespace).cloned()
        };
        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                tracing::warn!("in-memory snapshot under '{namespace}' is unreadable, ignoring: {err}");
                Ok(None)
            }
        }
    }

    async fn save(&self, namespace: &str, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let mut map = self.inner.lock().expect("snapshot map poisoned");
        map.insert(namespace.to_string(), payload);
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let mut map = self.inner.lock().expect("snapshot map poisoned");
        map.remove(namespace);
        Ok(())
    }
}
