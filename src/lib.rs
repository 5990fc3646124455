pub mod connectors;
pub mod contract;
pub mod load_config;
pub mod ollama;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod repository;
pub mod tracker;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::load_config::load_config;
use crate::pipeline::{run_all, RunReport};
use crate::registry::Registry;
use crate::repository::create_repository;
use crate::tracker::ProcessedIdCache;

#[derive(Parser)]
#[clap(
    name = "llm-harvest",
    version,
    about = "Fetch records from configured sources, filter them with a local LLM and persist the survivors"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one ingestion pass over every enabled source in the config file
    Run {
        /// Path to the YAML config file
        #[clap(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Override the configured log level (trace|debug|info|warn|error)
        #[clap(long)]
        log_level: Option<String>,

        /// Skip the Redis dedupe cache and rely on the repository only
        #[clap(long)]
        no_cache: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main().
/// Returns the run report so main() can map it onto the process exit code.
pub async fn run(cli: Cli) -> Result<RunReport> {
    match cli.command {
        Commands::Run {
            config,
            log_level,
            no_cache,
        } => {
            let config = load_config(config)?;
            init_tracing(log_level.as_deref().unwrap_or(&config.logging.level));

            let registry = Registry::builtin(&config.ollama);
            let mut repository = create_repository(&config.database)?;

            let mut cache = match (&config.cache, no_cache) {
                (Some(cache_config), false) if cache_config.enabled => {
                    ProcessedIdCache::connect(&cache_config.url).await
                }
                _ => ProcessedIdCache::disabled(),
            };

            let report = run_all(&config, &registry, repository.as_mut(), &mut cache).await?;
            Ok(report)
        }
    }
}

/// Subscriber init is idempotent so tests can invoke `run` repeatedly.
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
