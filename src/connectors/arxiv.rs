//! arXiv connector: queries the public Atom API and emits papers in the
//! pipeline's unified item shape. The entry id doubles as the dedupe key;
//! arXiv keeps it stable across fetches of the same paper.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::connectors::normalize_whitespace;
use crate::contract::{ConfigError, FetchError, Item, SourceConnector};

/// Discriminator this connector registers under.
pub const KIND: &str = "arxiv";

const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";
const USER_AGENT: &str = "llm-harvest/0.1 (+github.com/kasbuunk/llm-harvest)";

const SORT_BY_VALUES: [&str; 3] = ["relevance", "lastUpdatedDate", "submittedDate"];
const SORT_ORDER_VALUES: [&str; 2] = ["ascending", "descending"];

#[derive(Debug, Clone, Deserialize)]
pub struct ArxivConfig {
    pub query: String,
    pub max_results: u32,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Endpoint override, mainly for tests against a local fixture server.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_sort_by() -> String {
    "submittedDate".to_string()
}

fn default_sort_order() -> String {
    "descending".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Atom feed shapes, limited to the fields the unified item needs.

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "category", default)]
    categories: Vec<Category>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
    #[serde(rename = "@type", default)]
    content_type: Option<String>,
}

pub struct ArxivConnector {
    config: ArxivConfig,
    http: reqwest::Client,
}

impl ArxivConnector {
    pub fn from_config(raw: &serde_yaml::Value) -> Result<Self, ConfigError> {
        if raw.is_null() {
            return Err(ConfigError::MissingKey("config"));
        }
        let config: ArxivConfig = serde_yaml::from_value(raw.clone())?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "arxiv",
                message: e.to_string(),
            })?;

        Ok(Self { config, http })
    }

    fn items_from_feed(&self, body: &str) -> Result<Vec<Item>, FetchError> {
        let feed: Feed =
            from_str(body).map_err(|e| FetchError::Decode(format!("arxiv atom feed: {e}")))?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            if !self.within_date_range(&entry.published) {
                debug!(entry = %entry.id, "entry outside configured date range, skipping");
                continue;
            }
            items.push(convert_entry(entry));
        }
        Ok(items)
    }

    /// Date filtering on the published timestamp; entries with a timestamp
    /// the API failed to format pass through unfiltered.
    fn within_date_range(&self, published: &str) -> bool {
        let Some(date) = DateTime::parse_from_rfc3339(published)
            .ok()
            .map(|dt| dt.date_naive())
        else {
            return true;
        };

        if let Some(start) = self.config.start_date {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.config.end_date {
            if date > end {
                return false;
            }
        }
        true
    }
}

fn convert_entry(entry: Entry) -> Item {
    let authors: Vec<String> = entry.authors.into_iter().map(|a| a.name).collect();
    let categories: Vec<String> = entry.categories.into_iter().map(|c| c.term).collect();
    let pdf_url = entry
        .links
        .iter()
        .find(|l| {
            l.title.as_deref() == Some("pdf")
                || l.content_type.as_deref() == Some("application/pdf")
        })
        .map(|l| l.href.clone());

    let mut metadata = serde_json::Map::new();
    metadata.insert("authors".into(), json!(authors));
    metadata.insert("categories".into(), json!(categories));
    metadata.insert("published".into(), json!(entry.published));
    if let Some(updated) = entry.updated {
        metadata.insert("updated".into(), json!(updated));
    }
    if let Some(pdf_url) = pdf_url {
        metadata.insert("pdf_url".into(), json!(pdf_url));
    }

    Item {
        id: entry.id,
        title: normalize_whitespace(&entry.title),
        content: normalize_whitespace(&entry.summary),
        metadata,
    }
}

#[async_trait]
impl SourceConnector for ArxivConnector {
    fn validate_config(&self) -> Result<(), ConfigError> {
        if self.config.query.trim().is_empty() {
            return Err(ConfigError::MissingKey("query"));
        }
        if self.config.max_results == 0 || self.config.max_results > 1000 {
            return Err(ConfigError::InvalidValue {
                key: "max_results",
                message: format!(
                    "must be between 1 and 1000, got {}",
                    self.config.max_results
                ),
            });
        }
        if !SORT_BY_VALUES.contains(&self.config.sort_by.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "sort_by",
                message: format!("unknown sort criterion '{}'", self.config.sort_by),
            });
        }
        if !SORT_ORDER_VALUES.contains(&self.config.sort_order.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "sort_order",
                message: format!("unknown sort order '{}'", self.config.sort_order),
            });
        }
        if let (Some(start), Some(end)) = (self.config.start_date, self.config.end_date) {
            if start > end {
                return Err(ConfigError::InvalidValue {
                    key: "start_date",
                    message: format!("start_date {start} is after end_date {end}"),
                });
            }
        }
        Ok(())
    }

    async fn fetch_data(&self) -> Result<Vec<Item>, FetchError> {
        info!(query = %self.config.query, max_results = self.config.max_results, "fetching arxiv feed");

        let response = self
            .http
            .get(&self.config.api_url)
            .query(&[
                ("search_query", self.config.query.as_str()),
                ("start", "0"),
                ("max_results", &self.config.max_results.to_string()),
                ("sortBy", self.config.sort_by.as_str()),
                ("sortOrder", self.config.sort_order.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let items = self.items_from_feed(&body)?;
        info!(count = items.len(), "arxiv fetch complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <updated>2024-01-16T00:00:00Z</updated>
    <published>2024-01-15T09:30:00Z</published>
    <title>On the
      Alignment of Things</title>
    <summary>  We study
      alignment.  </summary>
    <author><name>A. Author</name></author>
    <author><name>B. Author</name></author>
    <link href="http://arxiv.org/abs/2401.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v1" rel="related" type="application/pdf"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2312.99999v2</id>
    <updated>2023-12-02T00:00:00Z</updated>
    <published>2023-12-01T12:00:00Z</published>
    <title>Older Paper</title>
    <summary>Unrelated.</summary>
    <author><name>C. Author</name></author>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    fn connector(extra: &str) -> ArxivConnector {
        let yaml = format!("query: \"cat:cs.AI\"\nmax_results: 10\n{extra}");
        let raw: Value = serde_yaml::from_str(&yaml).unwrap();
        ArxivConnector::from_config(&raw).unwrap()
    }

    #[test]
    fn parses_entries_into_unified_items() {
        let items = connector("").items_from_feed(FIXTURE).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "http://arxiv.org/abs/2401.00001v1");
        assert_eq!(first.title, "On the Alignment of Things");
        assert_eq!(first.content, "We study alignment.");
        assert_eq!(first.metadata["authors"][1], "B. Author");
        assert_eq!(first.metadata["categories"][0], "cs.AI");
        assert_eq!(first.metadata["pdf_url"], "http://arxiv.org/pdf/2401.00001v1");
        assert_eq!(first.metadata["published"], "2024-01-15T09:30:00Z");
    }

    #[test]
    fn start_date_excludes_older_entries() {
        let items = connector("start_date: 2024-01-01\n")
            .items_from_feed(FIXTURE)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "http://arxiv.org/abs/2401.00001v1");
    }

    #[test]
    fn end_date_excludes_newer_entries() {
        let items = connector("end_date: 2023-12-31\n")
            .items_from_feed(FIXTURE)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "http://arxiv.org/abs/2312.99999v2");
    }

    #[test]
    fn garbled_feed_is_a_decode_error() {
        let err = connector("").items_from_feed("not xml at all").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn missing_query_is_rejected_before_io() {
        let raw: Value = serde_yaml::from_str("max_results: 10").unwrap();
        assert!(ArxivConnector::from_config(&raw).is_err());
    }

    #[test]
    fn out_of_range_max_results_is_rejected() {
        let c = connector("");
        assert!(c.validate_config().is_ok());

        let raw: Value = serde_yaml::from_str("query: x\nmax_results: 5000").unwrap();
        let c = ArxivConnector::from_config(&raw).unwrap();
        assert!(matches!(
            c.validate_config(),
            Err(ConfigError::InvalidValue {
                key: "max_results",
                ..
            })
        ));
    }

    #[test]
    fn unknown_sort_criterion_is_rejected() {
        let raw: Value =
            serde_yaml::from_str("query: x\nmax_results: 5\nsort_by: shuffled").unwrap();
        let c = ArxivConnector::from_config(&raw).unwrap();
        assert!(matches!(
            c.validate_config(),
            Err(ConfigError::InvalidValue { key: "sort_by", .. })
        ));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let c = connector("start_date: 2024-06-01\nend_date: 2024-01-01\n");
        assert!(c.validate_config().is_err());
    }
}
