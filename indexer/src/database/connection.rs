//! Database connection management

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::Executor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::database::schema::MIGRATIONS;
use crate::error::Result;

const DEFAULT_MAX_CONNECTIONS: u32 = 8;

pub struct Database {
    pool: sqlx::SqlitePool,
    path: PathBuf,
    max_connections: u32,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self> {
        Self::with_max_connections(database_path, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn with_max_connections(database_path: &Path, max_connections: u32) -> Result<Self> {
        // Ensure the database directory exists
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = Self::connect(database_path, max_connections).await?;

        Ok(Self {
            pool,
            path: database_path.to_path_buf(),
            max_connections,
        })
    }

    async fn connect(database_path: &Path, max_connections: u32) -> Result<sqlx::SqlitePool> {
        // WAL keeps readers of the mirror unblocked while a round writes.
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in MIGRATIONS {
            (&mut *tx).execute(*statement).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Drop the current pool and open a fresh one on the same file.
    ///
    /// The old pool is kept if the new connection cannot be established.
    pub async fn reconnect(&mut self) -> Result<()> {
        let pool = match Self::connect(&self.path, self.max_connections).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Reconnect to {} failed: {}", self.path.display(), e);
                return Err(e);
            }
        };

        let old = std::mem::replace(&mut self.pool, pool);
        old.close().await;
        info!("Reconnected to database {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        // Verify the database file was created
        assert!(db_path.exists());

        db.migrate().await.unwrap();

        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blocks")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(result.0, 0);

        drop(db);
        temp_dir.close().unwrap();
    }

    #[tokio::test]
    async fn test_database_directory_creation() {
        let temp_dir = tempdir().unwrap();
        let nested_dir = temp_dir.path().join("nested").join("deep");
        let db_path = nested_dir.join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        assert!(nested_dir.exists());
        assert!(db_path.exists());

        drop(db);
        temp_dir.close().unwrap();
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();

        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let tables: Vec<String> = tables.into_iter().map(|(name,)| name).collect();
        assert_eq!(
            tables,
            vec![
                "addresses",
                "blocks",
                "inputs",
                "outputs",
                "stream_creators",
                "stream_item_publishers",
                "stream_items",
                "streams",
                "transactions",
            ]
        );
    }

    #[tokio::test]
    async fn test_migration_failure() {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();

        // A pre-existing table with a different shape breaks the index creation
        sqlx::query("CREATE TABLE blocks (id INTEGER PRIMARY KEY)")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.migrate().await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_keeps_data() {
        let temp_dir = tempdir().unwrap();
        let mut db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.migrate().await.unwrap();

        sqlx::query("INSERT INTO addresses (address) VALUES ('1Miner')")
            .execute(db.pool())
            .await
            .unwrap();

        db.reconnect().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
