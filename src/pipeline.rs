//! Pipeline controller: sequences fetch → dedupe → process → persist for
//! every enabled source, in configuration order.
//!
//! Failure containment is the whole point of this module:
//! - a per-item processing failure is absorbed into that item's own filter
//!   result and never stops the batch;
//! - a per-source failure (bad config, fetch error, storage fault) is
//!   captured in the run report and the loop moves on to the next source;
//! - only a repository connect/close fault aborts the run, and the storage
//!   handle is released on every exit path.
//!
//! Execution is deliberately sequential — sources one at a time, items one
//! at a time in fetch order. Throughput is bounded by the external judging
//! call, not local work, and sequential execution keeps the dedupe
//! read-then-write per source free of races.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::contract::{Item, PersistenceError, ProcessedItem, Repository, SourceError};
use crate::load_config::{AppConfig, SourceConfig};
use crate::ollama::OllamaClient;
use crate::processors::ollama_filter;
use crate::registry::Registry;
use crate::tracker::ProcessedIdCache;

/// Counters accumulated while a single source moves through the stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub fetched: usize,
    pub new: usize,
    pub processed: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub persisted: usize,
}

/// Outcome of one source: its counters, plus the failure that stopped it
/// if it did not run to completion.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub stats: SourceStats,
    pub error: Option<SourceError>,
}

/// Everything a run did, per source. Observable via logs and this value
/// only; the report itself is not persisted.
#[derive(Debug, Default)]
pub struct RunReport {
    pub sources: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn total_errors(&self) -> usize {
        self.sources.iter().map(|s| s.stats.errors).sum()
    }

    /// True when every source completed and no item degraded with an error.
    pub fn is_clean(&self) -> bool {
        self.failed_sources() == 0 && self.total_errors() == 0
    }
}

/// Run every enabled source in configuration order.
///
/// The repository is connected once before the loop and closed on every
/// exit path; a connect/close fault is the only error surfaced here, all
/// others are captured per source inside the report.
pub async fn run_all(
    config: &AppConfig,
    registry: &Registry,
    repository: &mut dyn Repository,
    cache: &mut ProcessedIdCache,
) -> Result<RunReport, PersistenceError> {
    info!("ingestion run starting");

    probe_ollama_if_configured(config).await;

    repository.connect().await?;

    let mut report = RunReport::default();
    for source in config.sources.iter().filter(|s| s.enabled) {
        let outcome = run_source(source, registry, &*repository, cache).await;
        report.sources.push(outcome);
    }

    log_summary(&report);

    repository.close().await?;
    Ok(report)
}

/// Run a single source through the full stage sequence, catching its
/// failure at this boundary so the caller's loop continues regardless.
pub async fn run_source(
    source: &SourceConfig,
    registry: &Registry,
    repository: &dyn Repository,
    cache: &mut ProcessedIdCache,
) -> SourceOutcome {
    info!(source = %source.name, connector = %source.connector, "processing source");

    let mut stats = SourceStats::default();
    let error = match execute_source(source, registry, repository, cache, &mut stats).await {
        Ok(()) => {
            info!(source = %source.name, persisted = stats.persisted, "source complete");
            None
        }
        Err(e) => {
            error!(source = %source.name, stage = e.stage(), error = %e, "source failed");
            Some(e)
        }
    };

    SourceOutcome {
        source: source.name.clone(),
        stats,
        error,
    }
}

async fn execute_source(
    source: &SourceConfig,
    registry: &Registry,
    repository: &dyn Repository,
    cache: &mut ProcessedIdCache,
    stats: &mut SourceStats,
) -> Result<(), SourceError> {
    // Resolve and validate before any network IO happens.
    let connector = registry.connector(&source.connector, &source.config)?;
    connector.validate_config()?;

    let fetched = connector.fetch_data().await?;
    stats.fetched = fetched.len();
    info!(source = %source.name, fetched = stats.fetched, "fetch complete");
    if fetched.is_empty() {
        warn!(source = %source.name, "source returned no records");
        return Ok(());
    }

    let known = dedupe_ids(&source.name, repository, cache).await?;
    let new_items: Vec<Item> = fetched
        .into_iter()
        .filter(|item| {
            if item.id.is_empty() {
                warn!(source = %source.name, title = %item.title, "dropping item without id");
                return false;
            }
            !known.contains(&item.id)
        })
        .collect();
    stats.new = new_items.len();
    info!(
        source = %source.name,
        new = stats.new,
        known = known.len(),
        "dedupe complete"
    );
    if new_items.is_empty() {
        return Ok(());
    }

    let to_persist: Vec<ProcessedItem> = match &source.processor {
        Some(kind) => {
            let processor = registry.processor(kind, &source.processor_config)?;
            let total = new_items.len();
            let mut out = Vec::with_capacity(total);
            for (idx, item) in new_items.into_iter().enumerate() {
                debug!(source = %source.name, n = idx + 1, total, id = %item.id, "processing item");
                let processed = processor.process_item(item).await;
                record_result(stats, &processed);
                out.push(processed);
            }
            out
        }
        None => new_items.into_iter().map(ProcessedItem::from).collect(),
    };

    repository.save_items(&source.name, &to_persist).await?;
    stats.persisted = to_persist.len();

    let ids: Vec<String> = to_persist.iter().map(|p| p.item.id.clone()).collect();
    cache.mark_processed(&source.name, &ids).await;

    Ok(())
}

/// Dedupe set for one source: the cache answers when it can, the
/// repository is the authority otherwise.
async fn dedupe_ids(
    source: &str,
    repository: &dyn Repository,
    cache: &mut ProcessedIdCache,
) -> Result<HashSet<String>, SourceError> {
    if let Some(ids) = cache.processed_ids(source).await {
        return Ok(ids);
    }
    Ok(repository.processed_ids(source).await?)
}

fn record_result(stats: &mut SourceStats, item: &ProcessedItem) {
    stats.processed += 1;
    match &item.filter_result {
        Some(result) if result.error => stats.errors += 1,
        Some(result) if result.passed => stats.passed += 1,
        Some(_) => stats.failed += 1,
        None => {}
    }
}

/// One probe before the loop when any enabled source judges through
/// Ollama. An unreachable service is only warned about: each item then
/// degrades individually instead of the run aborting.
async fn probe_ollama_if_configured(config: &AppConfig) {
    let wants_ollama = config
        .sources
        .iter()
        .any(|s| s.enabled && s.processor.as_deref() == Some(ollama_filter::KIND));
    if !wants_ollama {
        return;
    }

    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            if !client.check_connection().await {
                warn!(
                    url = %config.ollama.url,
                    "ollama unreachable; judgements will degrade to processed = false"
                );
            }
        }
        Err(e) => warn!(error = %e, "could not build ollama client for the availability probe"),
    }
}

fn log_summary(report: &RunReport) {
    for outcome in &report.sources {
        match &outcome.error {
            Some(e) => info!(
                source = %outcome.source,
                stage = e.stage(),
                error = %e,
                fetched = outcome.stats.fetched,
                "summary: source failed"
            ),
            None => info!(
                source = %outcome.source,
                fetched = outcome.stats.fetched,
                new = outcome.stats.new,
                processed = outcome.stats.processed,
                passed = outcome.stats.passed,
                failed = outcome.stats.failed,
                errors = outcome.stats.errors,
                persisted = outcome.stats.persisted,
                "summary: source complete"
            ),
        }
    }

    let fetched: usize = report.sources.iter().map(|s| s.stats.fetched).sum();
    let persisted: usize = report.sources.iter().map(|s| s.stats.persisted).sum();
    info!(
        sources = report.sources.len(),
        failed_sources = report.failed_sources(),
        item_errors = report.total_errors(),
        fetched,
        persisted,
        "run complete"
    );
}
