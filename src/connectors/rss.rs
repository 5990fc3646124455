//! Generic RSS 2.0 connector. The item id comes from `guid`, falling back
//! to `link`; entries carrying neither are dropped, since without a stable
//! id the dedupe step cannot do its job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::connectors::normalize_whitespace;
use crate::contract::{ConfigError, FetchError, Item, SourceConnector};

/// Discriminator this connector registers under.
pub const KIND: &str = "rss";

const USER_AGENT: &str = "llm-harvest/0.1 (+github.com/kasbuunk/llm-harvest)";

#[derive(Debug, Clone, Deserialize)]
pub struct RssConfig {
    pub url: String,
    #[serde(default)]
    pub max_items: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    #[serde(default)]
    guid: Option<Guid>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// `<guid>` may carry an isPermaLink attribute, so it deserializes as a
/// struct with text content rather than a plain string.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug)]
pub struct RssConnector {
    config: RssConfig,
    http: reqwest::Client,
}

impl RssConnector {
    pub fn from_config(raw: &serde_yaml::Value) -> Result<Self, ConfigError> {
        if raw.is_null() {
            return Err(ConfigError::MissingKey("config"));
        }
        let config: RssConfig = serde_yaml::from_value(raw.clone())?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "rss",
                message: e.to_string(),
            })?;

        Ok(Self { config, http })
    }

    fn items_from_feed(&self, body: &str) -> Result<Vec<Item>, FetchError> {
        let rss: Rss =
            from_str(body).map_err(|e| FetchError::Decode(format!("rss feed: {e}")))?;

        let mut items = Vec::with_capacity(rss.channel.items.len());
        for entry in rss.channel.items {
            let id = match item_id(&entry) {
                Some(id) => id,
                None => {
                    debug!(
                        title = entry.title.as_deref().unwrap_or(""),
                        "rss item has neither guid nor link, dropping"
                    );
                    continue;
                }
            };

            let title = normalize_whitespace(entry.title.as_deref().unwrap_or_default());
            let description =
                normalize_whitespace(entry.description.as_deref().unwrap_or_default());
            let content = if description.is_empty() {
                title.clone()
            } else {
                description
            };

            let mut metadata = serde_json::Map::new();
            if let Some(link) = entry.link {
                metadata.insert("link".into(), json!(link));
            }
            if let Some(published) = entry.pub_date.as_deref().and_then(parse_rfc2822) {
                metadata.insert("published".into(), json!(published));
            }

            items.push(Item {
                id,
                title,
                content,
                metadata,
            });

            if let Some(max) = self.config.max_items {
                if items.len() >= max {
                    break;
                }
            }
        }
        Ok(items)
    }
}

fn item_id(entry: &ChannelItem) -> Option<String> {
    entry
        .guid
        .as_ref()
        .map(|g| g.value.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            entry
                .link
                .as_ref()
                .map(|l| l.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

fn parse_rfc2822(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.to_rfc3339())
}

#[async_trait]
impl SourceConnector for RssConnector {
    fn validate_config(&self) -> Result<(), ConfigError> {
        if self.config.url.trim().is_empty() {
            return Err(ConfigError::MissingKey("url"));
        }
        if !self.config.url.starts_with("http://") && !self.config.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "url",
                message: format!("'{}' is not an http(s) url", self.config.url),
            });
        }
        if self.config.max_items == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_items",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_data(&self) -> Result<Vec<Item>, FetchError> {
        info!(url = %self.config.url, "fetching rss feed");

        let response = self
            .http
            .get(&self.config.url)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let items = self.items_from_feed(&body)?;
        info!(count = items.len(), "rss fetch complete");
        Ok(items)
    }
}
