use crate::parser::parse_feed_items;
use crate::types::{FetchConfig, FetchedItem, PulseError, Result, Source, SourceKind};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Produces candidate items for one source. Implementations never error:
/// a source that yields nothing upstream yields an empty list here.
#[async_trait]
pub trait FetchItems: Send + Sync {
    async fn fetch(&self, source: &Source) -> Vec<FetchedItem>;
}

/// One tier of a fallback chain: a lazy future that does no work unless
/// polled, so later tiers cost nothing when an earlier one yields.
type Tier<'a> = Pin<Box<dyn Future<Output = Result<Vec<FetchedItem>>> + Send + 'a>>;

/// Evaluate an ordered list of fallback tiers, stopping at the first one that
/// yields at least one item. Tier errors are demoted to an escalation to the
/// next tier and never propagate; the remaining tiers are dropped unpolled.
pub(crate) async fn first_yielding(label: &str, tiers: Vec<(&'static str, Tier<'_>)>) -> Vec<FetchedItem> {
    for (name, tier) in tiers {
        match tier.await {
            Ok(items) if !items.is_empty() => {
                debug!(source = label, tier = name, count = items.len(), "tier yielded items");
                return items;
            }
            Ok(_) => debug!(source = label, tier = name, "tier yielded nothing, trying next"),
            Err(e) => warn!(source = label, tier = name, error = %e, "tier failed, trying next"),
        }
    }
    Vec::new()
}

/// Strip protocol/domain prefixes and a leading `@` from a social handle.
pub fn normalize_social_handle(raw: &str) -> String {
    let mut v = raw.trim().to_string();
    if v.starts_with("http") {
        for prefix in [
            "https://x.com/",
            "http://x.com/",
            "https://twitter.com/",
            "http://twitter.com/",
        ] {
            v = v.replace(prefix, "");
        }
        if let Some(idx) = v.find('/') {
            v.truncate(idx);
        }
    }
    v.strip_prefix('@').map(str::to_string).unwrap_or(v)
}

#[derive(Debug, Deserialize)]
struct ScrapedPost {
    id: String,
    #[serde(default)]
    text: String,
}

fn status_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"status/(\d+)").expect("valid regex"))
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""videoId":"([A-Za-z0-9_-]{11})""#).expect("valid regex"))
}

/// Extract capture group 1 matches, deduped, preserving first-seen order.
fn extract_ids(re: &Regex, body: &str, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    re.captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .take(cap)
        .collect()
}

/// Multi-source fetcher with per-type cascading fallback chains.
pub struct SourceFetcher {
    client: Client,
    config: FetchConfig,
}

impl SourceFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::General(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(response.text().await?)
    }

    /// Primary social tier: native scraping API by normalized handle.
    async fn scrape_api_tier(&self, handle: &str) -> Result<Vec<FetchedItem>> {
        let base = self
            .config
            .scrape_api_base
            .as_deref()
            .ok_or_else(|| PulseError::MissingCredential("SCRAPE_API_BASE".to_string()))?;
        let url = format!("{}/user/{}", base.trim_end_matches('/'), handle);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PulseError::General(format!(
                "scrape API returned HTTP {}",
                response.status()
            )));
        }
        let posts: Vec<ScrapedPost> = response.json().await?;
        Ok(posts
            .into_iter()
            .take(self.config.max_items)
            .map(|p| FetchedItem {
                title: p.text.clone(),
                url: format!("https://x.com/{handle}/status/{}", p.id),
                summary: p.text,
            })
            .collect())
    }

    /// Second social tier: RSS-bridge mirrors in priority order; the first
    /// mirror returning any entries wins.
    async fn mirror_rss_tier(&self, handle: &str) -> Result<Vec<FetchedItem>> {
        for host in &self.config.mirror_hosts {
            let url = format!("https://{host}/{handle}/rss");
            match self.get_text(&url).await {
                Ok(body) => match parse_feed_items(&body, "Post", self.config.max_items) {
                    Ok(items) if !items.is_empty() => return Ok(items),
                    Ok(_) => debug!(host, "mirror feed empty"),
                    Err(e) => debug!(host, error = %e, "mirror feed unparseable"),
                },
                Err(e) => debug!(host, error = %e, "mirror unreachable"),
            }
        }
        Ok(Vec::new())
    }

    /// Last-resort social tier: readability-proxied HTML of each mirror,
    /// regex-extracting post IDs and reconstructing canonical URLs. Items in
    /// this tier carry no title or summary.
    async fn proxied_html_tier(&self, handle: &str) -> Result<Vec<FetchedItem>> {
        let proxy = self.config.readability_proxy.trim_end_matches('/');
        for host in &self.config.mirror_hosts {
            let url = format!("{proxy}/http://{host}/{handle}");
            let body = match self.get_text(&url).await {
                Ok(body) => body,
                Err(e) => {
                    debug!(host, error = %e, "proxied mirror unreachable");
                    continue;
                }
            };
            let ids = extract_ids(status_id_regex(), &body, self.config.max_items);
            if ids.is_empty() {
                continue;
            }
            return Ok(ids
                .into_iter()
                .map(|id| FetchedItem {
                    title: String::new(),
                    url: format!("https://x.com/{handle}/status/{id}"),
                    summary: String::new(),
                })
                .collect());
        }
        Ok(Vec::new())
    }

    async fn fetch_social(&self, identifier: &str) -> Vec<FetchedItem> {
        let handle = normalize_social_handle(identifier);
        let tiers: Vec<(&'static str, Tier<'_>)> = vec![
            ("scrape_api", Box::pin(self.scrape_api_tier(&handle))),
            ("mirror_rss", Box::pin(self.mirror_rss_tier(&handle))),
            ("proxied_html", Box::pin(self.proxied_html_tier(&handle))),
        ];
        first_yielding(identifier, tiers).await
    }

    async fn fetch_video(&self, identifier: &str) -> Vec<FetchedItem> {
        // Channel feed URLs parse directly.
        if identifier.contains("feeds/videos.xml") {
            return match self.fetch_rss_inner(identifier, "Video").await {
                Ok(items) => items,
                Err(e) => {
                    warn!(identifier, error = %e, "video feed fetch failed");
                    Vec::new()
                }
            };
        }

        // Otherwise normalize handle forms to the flat /videos listing.
        let listing_url = if identifier.starts_with('@') {
            format!("https://www.youtube.com/{identifier}/videos")
        } else if identifier.contains("youtube.com/@") && !identifier.contains("/videos") {
            format!("{}/videos", identifier.trim_end_matches('/'))
        } else {
            identifier.to_string()
        };

        let body = match self.get_text(&listing_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %listing_url, error = %e, "channel listing fetch failed");
                return Vec::new();
            }
        };

        extract_ids(video_id_regex(), &body, self.config.max_items)
            .into_iter()
            .map(|id| FetchedItem {
                title: "Video".to_string(),
                url: format!("https://www.youtube.com/watch?v={id}"),
                summary: String::new(),
            })
            .collect()
    }

    async fn fetch_rss_inner(&self, url: &str, default_title: &str) -> Result<Vec<FetchedItem>> {
        let body = self.get_text(url).await?;
        parse_feed_items(&body, default_title, self.config.max_items)
    }

    async fn fetch_rss(&self, url: &str) -> Vec<FetchedItem> {
        match self.fetch_rss_inner(url, "Article").await {
            Ok(items) => items,
            Err(e) => {
                warn!(url, error = %e, "rss fetch failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl FetchItems for SourceFetcher {
    async fn fetch(&self, source: &Source) -> Vec<FetchedItem> {
        let mut items = match source.kind {
            SourceKind::SocialFeed => self.fetch_social(&source.identifier).await,
            SourceKind::VideoChannel => self.fetch_video(&source.identifier).await,
            SourceKind::Rss => self.fetch_rss(&source.identifier).await,
        };
        items.truncate(self.config.max_items);
        items
    }
}
