//! Relevance filter backed by a local Ollama model. Every expected failure
//! mode is absorbed into the item's own filter result, so a flaky model
//! call never takes down the rest of the batch.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::contract::{ConfigError, FilterResult, Item, ItemProcessor, ProcessedItem};
use crate::load_config::OllamaConfig;
use crate::ollama::OllamaClient;

/// Discriminator this processor registers under.
pub const KIND: &str = "ollama-filter";

const DEFAULT_FILTER_PROMPT: &str =
    "Decide whether this record is relevant. Return a boolean verdict and a short reason.";

/// Cap on the content excerpt included in the prompt, to stay well inside
/// the model's context window.
const CONTENT_EXCERPT_CHARS: usize = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaFilterConfig {
    #[serde(default)]
    pub filter_prompt: Option<String>,
}

pub struct OllamaFilterProcessor {
    client: OllamaClient,
    filter_prompt: String,
}

impl OllamaFilterProcessor {
    pub fn from_config(
        raw: &serde_yaml::Value,
        ollama: &OllamaConfig,
    ) -> Result<Self, ConfigError> {
        let config: OllamaFilterConfig = if raw.is_null() {
            OllamaFilterConfig::default()
        } else {
            serde_yaml::from_value(raw.clone())?
        };

        let filter_prompt = match config.filter_prompt {
            Some(prompt) => prompt,
            None => {
                warn!("no filter_prompt configured, using the default relevance prompt");
                DEFAULT_FILTER_PROMPT.to_string()
            }
        };

        Ok(Self {
            client: OllamaClient::new(ollama)?,
            filter_prompt,
        })
    }

    fn prompt_for(&self, item: &Item) -> String {
        let excerpt: String = item.content.chars().take(CONTENT_EXCERPT_CHARS).collect();
        format!(
            "{}\n\nTitle: {}\nContent: {}",
            self.filter_prompt, item.title, excerpt
        )
    }
}

#[async_trait]
impl ItemProcessor for OllamaFilterProcessor {
    async fn process_item(&self, item: Item) -> ProcessedItem {
        let prompt = self.prompt_for(&item);

        match self.client.verdict(&prompt).await {
            Ok(verdict) => {
                info!(id = %item.id, passed = verdict.valid, "relevance judgement complete");
                ProcessedItem {
                    item,
                    processed: true,
                    filter_result: Some(FilterResult {
                        passed: verdict.valid,
                        reason: verdict.reason,
                        model: Some(self.client.model().to_string()),
                        error: false,
                    }),
                }
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "relevance judgement failed, keeping item unprocessed");
                ProcessedItem {
                    item,
                    processed: false,
                    filter_result: Some(FilterResult {
                        passed: false,
                        reason: format!("processing failed: {e}"),
                        model: Some(self.client.model().to_string()),
                        error: true,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str) -> Item {
        Item {
            id: "x1".into(),
            title: "A title".into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn prompt_contains_configured_instruction_and_title() {
        let raw: serde_yaml::Value =
            serde_yaml::from_str("filter_prompt: \"Only AI safety papers.\"").unwrap();
        let processor =
            OllamaFilterProcessor::from_config(&raw, &OllamaConfig::default()).unwrap();

        let prompt = processor.prompt_for(&item("short body"));
        assert!(prompt.starts_with("Only AI safety papers."));
        assert!(prompt.contains("Title: A title"));
        assert!(prompt.contains("Content: short body"));
    }

    #[test]
    fn prompt_truncates_long_content() {
        let processor =
            OllamaFilterProcessor::from_config(&serde_yaml::Value::Null, &OllamaConfig::default())
                .unwrap();

        let long = "x".repeat(5000);
        let prompt = processor.prompt_for(&item(&long));
        assert!(prompt.len() < 1500);
    }

    #[test]
    fn missing_prompt_falls_back_to_the_default() {
        let processor =
            OllamaFilterProcessor::from_config(&serde_yaml::Value::Null, &OllamaConfig::default())
                .unwrap();
        assert_eq!(processor.filter_prompt, DEFAULT_FILTER_PROMPT);
    }
}
