//! Connector variants. Each submodule implements [`SourceConnector`] for
//! one external feed and exposes the discriminator string it registers
//! under.
//!
//! [`SourceConnector`]: crate::contract::SourceConnector

pub mod arxiv;
pub mod rss;

pub use arxiv::ArxivConnector;
pub use rss::RssConnector;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Collapse runs of whitespace and trim. Feeds embed newlines and
/// indentation inside titles and summaries.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s.trim(), " ").into_owned()
}
