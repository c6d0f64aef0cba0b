use crate::types::{FetchedItem, PulseError, Result};
use feed_rs::parser;
use tracing::debug;

/// Parse an RSS/Atom document into candidate items, capped at `max_items`.
/// Entries without a link are dropped; a missing title falls back to
/// `default_title`.
pub fn parse_feed_items(
    content: &str,
    default_title: &str,
    max_items: usize,
) -> Result<Vec<FetchedItem>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| PulseError::Parse(format!("failed to parse feed: {e}")))?;

    let mut items = Vec::new();
    for entry in feed.entries.into_iter() {
        if items.len() >= max_items {
            break;
        }
        let url = match entry.links.first() {
            Some(link) => link.href.clone(),
            None => continue,
        };
        let title = entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title.to_string());
        let summary = entry.summary.map(|s| s.content).unwrap_or_default();
        items.push(FetchedItem { title, url, summary });
    }

    debug!(count = items.len(), "parsed feed items");
    Ok(items)
}
