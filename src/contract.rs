//! # contract: the pipeline's extension surface
//!
//! Everything a new data source or post-processing step has to implement
//! lives here: the unified record shapes ([`Item`], [`ProcessedItem`],
//! [`FilterResult`]), the three trait contracts ([`SourceConnector`],
//! [`ItemProcessor`], [`Repository`]) and the error taxonomy the controller
//! attributes failures with.
//!
//! ## Interface & Extensibility
//! - Implement [`SourceConnector`] for a new external feed and register it
//!   under a discriminator string (see the `registry` module). The pipeline
//!   itself never changes.
//! - Implement [`ItemProcessor`] for a new per-item enrichment step.
//! - Implement [`Repository`] to swap the backing store.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`, so consumers can generate
//!   deterministic mocks for unit/integration tests (exported under the
//!   `test-export-mocks` feature).

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Unified record shape every connector must emit.
///
/// `id` is the dedupe key and must be stable across repeated fetches of the
/// same logical record; everything source-specific goes into `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// An [`Item`] after the (optional) processing stage.
///
/// Sources without a configured processor persist their items unchanged,
/// with `processed` left false and no filter result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_result: Option<FilterResult>,
}

impl From<Item> for ProcessedItem {
    fn from(item: Item) -> Self {
        Self {
            item,
            processed: false,
            filter_result: None,
        }
    }
}

/// Outcome of a processor judgement on a single item.
///
/// `error` is the machine-checkable flag distinguishing "the model said no"
/// from "the call itself failed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub error: bool,
}

/// Connector or processor configuration rejected before any IO.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("malformed config section: {0}")]
    Malformed(#[from] serde_yaml::Error),
}

/// External retrieval failed; partial results are discarded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode feed: {0}")]
    Decode(String),
}

/// Unrecoverable storage fault.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("repository is not connected")]
    NotConnected,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("failed to encode record field: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure captured at the per-source boundary. The run loop records it,
/// logs it with the stage it occurred in, and moves on to the next source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown connector kind '{0}'")]
    UnknownConnector(String),

    #[error("unknown processor kind '{0}'")]
    UnknownProcessor(String),

    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl SourceError {
    /// Stage label used in logs and the run report.
    pub fn stage(&self) -> &'static str {
        match self {
            SourceError::UnknownConnector(_) | SourceError::UnknownProcessor(_) => "resolve",
            SourceError::Config(_) => "validate",
            SourceError::Fetch(_) => "fetch",
            SourceError::Persistence(_) => "persist",
        }
    }
}

/// Produces a finite sequence of [`Item`]s from one external source.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Check the connector-specific configuration. Runs before any network
    /// or filesystem IO is attempted.
    fn validate_config(&self) -> Result<(), ConfigError>;

    /// Fetch all matching records, in source order. All-or-nothing: a
    /// failure discards anything fetched so far in this invocation.
    async fn fetch_data(&self) -> Result<Vec<Item>, FetchError>;
}

/// Enriches or judges a single [`Item`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Process one item. Expected failure modes (timeout, malformed
    /// response, non-2xx status) degrade the item to `processed = false`
    /// with the error flag set instead of propagating, so one bad item
    /// never blocks the rest of the batch.
    async fn process_item(&self, item: Item) -> ProcessedItem;
}

/// Durable storage and dedupe-set lookup.
///
/// Ids are scoped per (source, id): two sources that happen to emit the
/// same id never dedupe each other.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Acquire the underlying storage handle, creating the store and its
    /// schema if missing.
    async fn connect(&mut self) -> Result<(), PersistenceError>;

    /// Ids already persisted for this source. Set semantics; used purely
    /// for membership tests in the dedupe stage.
    async fn processed_ids(&self, source: &str) -> Result<HashSet<String>, PersistenceError>;

    /// Batch-persist items for a source. Idempotent per (source, id): an
    /// existing row is updated in place, never duplicated.
    async fn save_items(
        &self,
        source: &str,
        items: &[ProcessedItem],
    ) -> Result<(), PersistenceError>;

    /// Release the storage handle. Invoked on every exit path of a run.
    async fn close(&mut self) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn processed_item_flattens_item_fields_on_the_wire() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("authors".into(), json!(["A. Author"]));
        let processed = ProcessedItem {
            item: Item {
                id: "arxiv-1".into(),
                title: "T".into(),
                content: "C".into(),
                metadata,
            },
            processed: true,
            filter_result: Some(FilterResult {
                passed: true,
                reason: "relevant".into(),
                model: Some("llama3".into()),
                error: false,
            }),
        };

        let value = serde_json::to_value(&processed).unwrap();
        assert_eq!(value["id"], "arxiv-1");
        assert_eq!(value["title"], "T");
        assert_eq!(value["metadata"]["authors"][0], "A. Author");
        assert_eq!(value["processed"], true);
        assert_eq!(value["filter_result"]["passed"], true);
    }

    #[test]
    fn passthrough_item_omits_filter_result() {
        let item = Item {
            id: "x".into(),
            title: "t".into(),
            content: "c".into(),
            metadata: serde_json::Map::new(),
        };
        let passthrough = ProcessedItem::from(item);
        assert!(!passthrough.processed);

        let value = serde_json::to_value(&passthrough).unwrap();
        assert!(value.get("filter_result").is_none());
    }

    #[test]
    fn item_wire_shape_accepts_missing_metadata() {
        let item: Item =
            serde_json::from_value(json!({"id": "a", "title": "b", "content": "c"})).unwrap();
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn source_error_reports_the_failing_stage() {
        let err = SourceError::UnknownConnector("nope".into());
        assert_eq!(err.stage(), "resolve");
        let err = SourceError::Fetch(FetchError::Decode("bad xml".into()));
        assert_eq!(err.stage(), "fetch");
    }
}
