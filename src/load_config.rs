use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Fully parsed and validated run configuration. Loaded once at startup and
/// immutable for the rest of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_kind")]
    pub kind: String,
    pub path: PathBuf,
}

/// Endpoint settings for the local judging service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Optional Redis dedupe accelerator. The pipeline works identically
/// without it, just with every dedupe lookup hitting the repository.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One entry in the source list: a connector kind plus its config mapping,
/// and optionally a processor kind plus its config mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub connector: String,
    #[serde(default)]
    pub config: serde_yaml::Value,
    #[serde(default)]
    pub processor: Option<String>,
    #[serde(default)]
    pub processor_config: serde_yaml::Value,
}

fn default_database_kind() -> String {
    "sqlite".to_string()
}

fn default_true() -> bool {
    true
}

/// Loads the YAML config file, applies environment overrides and validates
/// the result. Returns a ready-to-use [`AppConfig`] or an error describing
/// the offending key.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .with_context(|| format!("failed to read config file {:?}", path_ref))?;

    let mut config: AppConfig =
        serde_yaml::from_str(&config_content).context("failed to parse config YAML")?;

    apply_env_overrides(&mut config);
    validate(&config)?;

    info!(
        database = %config.database.path.display(),
        sources = config.sources.len(),
        "config loaded and merged successfully"
    );

    Ok(config)
}

/// Environment variables take precedence over the file, so deployments can
/// override endpoints without editing the config.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(path) = std::env::var("DATABASE_PATH") {
        config.database.path = PathBuf::from(path);
    }
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        config.ollama.url = url;
    }
    if let Ok(model) = std::env::var("OLLAMA_MODEL") {
        config.ollama.model = model;
    }
    if let Ok(raw) = std::env::var("OLLAMA_TIMEOUT_SECS") {
        match raw.parse() {
            Ok(secs) => config.ollama.timeout_secs = secs,
            Err(e) => warn!(value = %raw, error = %e, "ignoring non-numeric OLLAMA_TIMEOUT_SECS"),
        }
    }
    if let Ok(url) = std::env::var("REDIS_URL") {
        config.cache = Some(CacheConfig { url, enabled: true });
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        config.logging.level = level;
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    match config.database.kind.as_str() {
        "sqlite" => {}
        other => bail!("unsupported database kind: {other}"),
    }

    if config.sources.is_empty() {
        bail!("config has no sources");
    }

    let mut seen = HashSet::new();
    for (idx, source) in config.sources.iter().enumerate() {
        if source.name.trim().is_empty() {
            bail!("source #{idx} has an empty name");
        }
        if !seen.insert(source.name.as_str()) {
            bail!("duplicate source name '{}'", source.name);
        }
        if source.connector.trim().is_empty() {
            bail!("source '{}' has an empty connector kind", source.name);
        }
        if let Some(processor) = &source.processor {
            if processor.trim().is_empty() {
                bail!("source '{}' has an empty processor kind", source.name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const SAMPLE: &str = r#"
database:
  path: ./data/harvest.db

ollama:
  url: http://localhost:11434
  model: llama3

cache:
  url: redis://localhost:6379/0

logging:
  level: debug

sources:
  - name: arxiv-ai-safety
    connector: arxiv
    config:
      query: "cat:cs.AI AND safety"
      max_results: 50
    processor: ollama-filter
    processor_config:
      filter_prompt: "Is this paper about AI safety?"
  - name: vendor-blog
    enabled: false
    connector: rss
    config:
      url: https://example.com/feed.xml
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn parses_a_full_config() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.database.kind, "sqlite");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.sources.len(), 2);

        let arxiv = &config.sources[0];
        assert!(arxiv.enabled);
        assert_eq!(arxiv.connector, "arxiv");
        assert_eq!(arxiv.processor.as_deref(), Some("ollama-filter"));

        let blog = &config.sources[1];
        assert!(!blog.enabled);
        assert!(blog.processor.is_none());
        assert!(blog.processor_config.is_null());
    }

    #[test]
    #[serial]
    fn ollama_section_defaults_when_absent() {
        let file = write_config(
            r#"
database:
  path: ./x.db
sources:
  - name: s
    connector: rss
    config:
      url: https://example.com/feed.xml
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.ollama.model, "llama3");
        assert_eq!(config.ollama.timeout_secs, 30);
        assert!(config.cache.is_none());
    }

    #[test]
    #[serial]
    fn rejects_duplicate_source_names() {
        let file = write_config(
            r#"
database:
  path: ./x.db
sources:
  - name: twin
    connector: rss
  - name: twin
    connector: arxiv
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate source name"));
    }

    #[test]
    #[serial]
    fn rejects_empty_source_list() {
        let file = write_config("database:\n  path: ./x.db\nsources: []\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("no sources"));
    }

    #[test]
    #[serial]
    fn rejects_unknown_database_kind() {
        let file = write_config(
            r#"
database:
  kind: oracle
  path: ./x.db
sources:
  - name: s
    connector: rss
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported database kind"));
    }

    #[test]
    #[serial]
    fn env_vars_override_the_file() {
        let file = write_config(SAMPLE);
        std::env::set_var("DATABASE_PATH", "/tmp/override.db");
        std::env::set_var("OLLAMA_MODEL", "mistral");
        std::env::set_var("LOG_LEVEL", "trace");

        let config = load_config(file.path()).unwrap();

        std::env::remove_var("DATABASE_PATH");
        std::env::remove_var("OLLAMA_MODEL");
        std::env::remove_var("LOG_LEVEL");

        assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.logging.level, "trace");
    }
}
