//! SQLite-backed repository, suited to single-node deployments.
//!
//! The (source, id) primary key keeps coincidental id collisions between
//! sources from deduping each other, and makes `save_items` a plain upsert:
//! re-saving an id updates the row in place.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::contract::{
    ConfigError, FilterResult, Item, PersistenceError, ProcessedItem, Repository,
};
use crate::load_config::DatabaseConfig;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
  source TEXT NOT NULL,
  id TEXT NOT NULL,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  metadata TEXT NOT NULL,
  processed INTEGER NOT NULL DEFAULT 0,
  filter_result TEXT NULL,
  fetched_at TEXT NOT NULL,
  PRIMARY KEY (source, id)
);
CREATE INDEX IF NOT EXISTS items_processed_idx ON items(processed);
CREATE INDEX IF NOT EXISTS items_fetched_at_idx ON items(fetched_at DESC);
"#;

pub struct SqliteRepository {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl SqliteRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: None,
        }
    }

    fn pool(&self) -> Result<&SqlitePool, PersistenceError> {
        self.pool.as_ref().ok_or(PersistenceError::NotConnected)
    }

    /// Point lookup by (source, id). Mainly used to inspect what an upsert
    /// actually wrote.
    pub async fn item(
        &self,
        source: &str,
        id: &str,
    ) -> Result<Option<ProcessedItem>, PersistenceError> {
        let row = sqlx::query(
            "SELECT id, title, content, metadata, processed, filter_result \
             FROM items WHERE source = ?1 AND id = ?2",
        )
        .bind(source)
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let metadata: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&row.get::<String, _>("metadata"))?;
        let filter_result = row
            .get::<Option<String>, _>("filter_result")
            .map(|raw| serde_json::from_str::<FilterResult>(&raw))
            .transpose()?;

        Ok(Some(ProcessedItem {
            item: Item {
                id: row.get::<String, _>("id"),
                title: row.get::<String, _>("title"),
                content: row.get::<String, _>("content"),
                metadata,
            },
            processed: row.get::<i64, _>("processed") != 0,
            filter_result,
        }))
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn connect(&mut self) -> Result<(), PersistenceError> {
        if self.pool.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", self.path.display()))?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        info!(path = %self.path.display(), "connected to sqlite repository");
        self.pool = Some(pool);
        Ok(())
    }

    async fn processed_ids(&self, source: &str) -> Result<HashSet<String>, PersistenceError> {
        let rows = sqlx::query("SELECT id FROM items WHERE source = ?1")
            .bind(source)
            .fetch_all(self.pool()?)
            .await?;

        let ids: HashSet<String> = rows.iter().map(|row| row.get::<String, _>("id")).collect();
        debug!(source, count = ids.len(), "loaded persisted ids");
        Ok(ids)
    }

    async fn save_items(
        &self,
        source: &str,
        items: &[ProcessedItem],
    ) -> Result<(), PersistenceError> {
        if items.is_empty() {
            debug!(source, "no items to save");
            return Ok(());
        }

        let pool = self.pool()?;
        let mut tx = pool.begin().await?;
        let fetched_at = Utc::now().to_rfc3339();

        for entry in items {
            let metadata = serde_json::to_string(&entry.item.metadata)?;
            let filter_result = entry
                .filter_result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
INSERT INTO items (source, id, title, content, metadata, processed, filter_result, fetched_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(source, id) DO UPDATE SET
  title = excluded.title,
  content = excluded.content,
  metadata = excluded.metadata,
  processed = excluded.processed,
  filter_result = excluded.filter_result
"#,
            )
            .bind(source)
            .bind(&entry.item.id)
            .bind(&entry.item.title)
            .bind(&entry.item.content)
            .bind(metadata)
            .bind(entry.processed as i64)
            .bind(filter_result)
            .bind(&fetched_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(source, count = items.len(), "persisted items");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(path = %self.path.display(), "closed sqlite repository");
        }
        Ok(())
    }
}

/// Build the repository backend named in the database config.
pub fn create_repository(config: &DatabaseConfig) -> Result<Box<dyn Repository>, ConfigError> {
    match config.kind.as_str() {
        "sqlite" => Ok(Box::new(SqliteRepository::new(config.path.clone()))),
        other => Err(ConfigError::InvalidValue {
            key: "database.kind",
            message: format!("unsupported database kind '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn factory_rejects_unknown_backends() {
        let config = DatabaseConfig {
            kind: "postgres".to_string(),
            path: PathBuf::from("/tmp/x.db"),
        };
        assert!(matches!(
            create_repository(&config),
            Err(ConfigError::InvalidValue {
                key: "database.kind",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn operations_before_connect_are_rejected() {
        let repo = SqliteRepository::new("/tmp/never-created.db");
        let err = repo.processed_ids("s").await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotConnected));
    }
}
