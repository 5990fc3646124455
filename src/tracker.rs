//! Redis-backed dedupe accelerator.
//!
//! Strictly an optimisation over the repository's id set: every operation
//! degrades to a no-op when the connection could not be established, and
//! the pipeline falls back to querying the repository. Ids are namespaced
//! per source, matching the repository's (source, id) scoping.

use std::collections::HashSet;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

pub struct ProcessedIdCache {
    conn: Option<ConnectionManager>,
}

impl ProcessedIdCache {
    /// Connect to Redis at `url`. Connection failures are logged and leave
    /// the cache inert rather than failing the run.
    pub async fn connect(url: &str) -> Self {
        let conn = match redis::Client::open(url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    info!(url, "connected to dedupe cache");
                    Some(conn)
                }
                Err(e) => {
                    warn!(url, error = %e, "dedupe cache unreachable, falling back to repository dedupe");
                    None
                }
            },
            Err(e) => {
                warn!(url, error = %e, "invalid dedupe cache url, falling back to repository dedupe");
                None
            }
        };
        Self { conn }
    }

    /// A cache that never serves or records anything, for runs with the
    /// accelerator switched off.
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    fn key(source: &str) -> String {
        format!("harvest:{source}:processed_ids")
    }

    /// Known ids for a source, or None when the cache is unavailable or has
    /// nothing recorded yet — callers then consult the repository.
    pub async fn processed_ids(&mut self, source: &str) -> Option<HashSet<String>> {
        let conn = self.conn.as_mut()?;
        let result: Result<HashSet<String>, _> = conn.smembers(Self::key(source)).await;
        match result {
            Ok(ids) if ids.is_empty() => None,
            Ok(ids) => {
                debug!(source, count = ids.len(), "dedupe ids served from cache");
                Some(ids)
            }
            Err(e) => {
                warn!(source, error = %e, "dedupe cache read failed, falling back to repository");
                None
            }
        }
    }

    /// Record ids after a successful save. Failures only cost the next run
    /// a repository lookup, so they are logged and swallowed.
    pub async fn mark_processed(&mut self, source: &str, ids: &[String]) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if ids.is_empty() {
            return;
        }

        let result: Result<(), _> = conn.sadd(Self::key(source), ids).await;
        match result {
            Ok(()) => debug!(source, count = ids.len(), "dedupe cache updated"),
            Err(e) => warn!(source, error = %e, "dedupe cache update failed"),
        }
    }
}
