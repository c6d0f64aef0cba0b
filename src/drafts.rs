use crate::llm::CompletionClient;
use crate::store::Store;
use crate::styles::StyleStore;
use crate::trends::compute_trends;
use crate::types::{ContentItem, Result, TrendTerm};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const RECENT_ITEM_LIMIT: usize = 50;
const STATIC_TREND_LINES: [&str; 3] = [
    "AI-assisted creation workflows",
    "Platform algorithm shifts",
    "Audience retention strategies",
];
const PROMPT_LINK_LIMIT: usize = 12;
const MAX_ATTEMPTS: usize = 3;
const BACKOFF_CEILING: Duration = Duration::from_secs(8);

/// Knobs for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_links: usize,
    pub num_trends: usize,
    pub include_intro: bool,
    pub include_links: bool,
    pub include_trends: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_links: 5,
            num_trends: 3,
            include_intro: true,
            include_links: true,
            include_trends: true,
        }
    }
}

/// Turns aggregated content, trend terms, and the user's writing samples into
/// a persisted newsletter draft. The completion backend is optional: with no
/// client configured (or one that stays down through the retry budget) a
/// deterministic templated draft is produced instead, so draft generation
/// never blocks on an unavailable service.
pub struct DraftPipeline {
    store: Arc<dyn Store>,
    styles: Arc<dyn StyleStore>,
    llm: Option<Arc<dyn CompletionClient>>,
}

impl DraftPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        styles: Arc<dyn StyleStore>,
        llm: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        Self { store, styles, llm }
    }

    /// Generate and persist a draft. Returns the draft text, or an empty
    /// string (with nothing persisted) when there is no content to draft from.
    pub async fn generate_and_save_draft(
        &self,
        user_id: Uuid,
        selected_item_ids: Option<&[Uuid]>,
        options: &GenerateOptions,
    ) -> Result<String> {
        let mut items = self.store.list_recent_content(user_id, RECENT_ITEM_LIMIT).await?;
        if let Some(selected) = selected_item_ids {
            let wanted: HashSet<Uuid> = selected.iter().copied().collect();
            items.retain(|item| wanted.contains(&item.id));
        }
        if items.is_empty() {
            info!(%user_id, "no content selected, skipping draft");
            return Ok(String::new());
        }

        let samples = match self.styles.style_samples(user_id).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(%user_id, error = %e, "style samples unavailable, drafting without them");
                Vec::new()
            }
        };

        let trends = compute_trends(&items, Utc::now());
        let prompt = build_prompt(&items, &samples, &trends, options);

        let text = match &self.llm {
            Some(client) => match self.complete_with_retry(client.as_ref(), &prompt, options).await {
                Some(text) => text,
                None => {
                    warn!(%user_id, "completion retries exhausted, using templated draft");
                    fallback_draft(&items, &trends, options)
                }
            },
            None => {
                info!(%user_id, "no completion credential configured, using templated draft");
                fallback_draft(&items, &trends, options)
            }
        };

        let draft = self.store.save_draft(user_id, &text).await?;
        info!(%user_id, draft_id = %draft.id, length = text.len(), "draft saved");
        Ok(text)
    }

    /// Up to three attempts with exponential backoff capped at eight seconds.
    /// Retries cover transient call failures only; exhaustion is not an error
    /// but a signal to fall back.
    async fn complete_with_retry(
        &self,
        client: &dyn CompletionClient,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Option<String> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: BACKOFF_CEILING,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match client.complete(prompt, options.temperature).await {
                Ok(completion) if !completion.text.trim().is_empty() => {
                    return Some(completion.text);
                }
                Ok(_) => warn!(attempt, "completion returned empty text"),
                Err(e) => warn!(attempt, error = %e, "completion attempt failed"),
            }
            if attempt < MAX_ATTEMPTS {
                if let Some(delay) = backoff.next_backoff() {
                    tokio::time::sleep(delay.min(BACKOFF_CEILING)).await;
                }
            }
        }
        None
    }
}

/// Single structured prompt: creator identity, writing samples, candidate
/// links, and trend terms, each section gated by the caller's toggles.
fn build_prompt(
    items: &[ContentItem],
    samples: &[String],
    trends: &[TrendTerm],
    options: &GenerateOptions,
) -> String {
    let mut prompt = String::from(
        "You are a newsletter ghostwriter for an independent content creator. \
         Write their next issue in Markdown.\n",
    );

    if !samples.is_empty() {
        prompt.push_str("\nMatch the voice of these writing samples:\n");
        for (i, sample) in samples.iter().enumerate() {
            prompt.push_str(&format!("\n--- Sample {} ---\n{}\n", i + 1, sample));
        }
    }

    if options.include_links {
        prompt.push_str("\nCandidate content to curate from:\n");
        for item in items.iter().take(PROMPT_LINK_LIMIT) {
            let title = if item.title.trim().is_empty() {
                "Untitled"
            } else {
                item.title.trim()
            };
            prompt.push_str(&format!("- {} — {}\n", title, item.url));
        }
    }

    if options.include_trends && !trends.is_empty() {
        prompt.push_str("\nTrending terms among this content:\n");
        for (term, score) in trends.iter().take(options.num_trends) {
            prompt.push_str(&format!("- {term} (score {score:.1})\n"));
        }
    }

    if options.include_intro {
        prompt.push_str("\nOpen with a short personal intro paragraph.\n");
    }
    prompt.push_str(&format!(
        "Curate around {} links with one-line commentary each.\n",
        options.num_links
    ));
    prompt
}

/// Deterministic draft assembled straight from the top items and trends.
fn fallback_draft(items: &[ContentItem], trends: &[TrendTerm], options: &GenerateOptions) -> String {
    let mut draft = String::new();

    if options.include_intro {
        draft.push_str("### Intro\n\n");
        draft.push_str("Here's what caught my eye since the last issue.\n\n");
    }

    if options.include_links {
        draft.push_str("### Curated Links\n\n");
        for item in items.iter().take(options.num_links.max(1)) {
            let title = if item.title.trim().is_empty() {
                "Untitled"
            } else {
                item.title.trim()
            };
            draft.push_str(&format!("- [{}]({})\n", title, item.url));
        }
        draft.push('\n');
    }

    if options.include_trends {
        draft.push_str("### Trends to Watch\n\n");
        if trends.is_empty() {
            // Nothing computed; fall back to the evergreen creator topics.
            for line in STATIC_TREND_LINES {
                draft.push_str(&format!("- {line}\n"));
            }
        } else {
            for (term, _) in trends.iter().take(options.num_trends) {
                draft.push_str(&format!("- {term}\n"));
            }
        }
        draft.push('\n');
    }

    draft.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str) -> ContentItem {
        ContentItem {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            workspace_id: None,
            title: title.to_string(),
            url: url.to_string(),
            summary: String::new(),
            replica: 0,
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn default_options() {
        let options = GenerateOptions::default();
        assert!((options.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(options.num_links, 5);
        assert_eq!(options.num_trends, 3);
    }

    #[test]
    fn prompt_respects_section_toggles() {
        let items = vec![item("Rust 2.0", "https://example.com/rust")];
        let trends = vec![("rust".to_string(), 3.0)];
        let options = GenerateOptions {
            include_trends: false,
            ..GenerateOptions::default()
        };
        let prompt = build_prompt(&items, &[], &trends, &options);
        assert!(prompt.contains("Rust 2.0 — https://example.com/rust"));
        assert!(!prompt.contains("Trending terms"));
    }

    #[test]
    fn prompt_caps_candidate_lines() {
        let items: Vec<_> = (0..20)
            .map(|i| item(&format!("Item {i}"), &format!("https://example.com/{i}")))
            .collect();
        let prompt = build_prompt(&items, &[], &[], &GenerateOptions::default());
        assert!(prompt.contains("Item 11"));
        assert!(!prompt.contains("Item 12"));
    }

    #[test]
    fn fallback_has_expected_sections_and_link_count() {
        let items: Vec<_> = (0..8)
            .map(|i| item(&format!("Item {i}"), &format!("https://example.com/{i}")))
            .collect();
        let trends = vec![("quantum".to_string(), 2.0)];
        let draft = fallback_draft(&items, &trends, &GenerateOptions::default());
        assert!(draft.starts_with("### Intro"));
        assert!(draft.contains("### Curated Links"));
        assert!(draft.contains("### Trends to Watch"));
        assert_eq!(draft.matches("- [").count(), 5);
        assert!(draft.contains("- quantum"));
    }

    #[test]
    fn fallback_uses_static_trends_when_nothing_trends() {
        let items = vec![item("Only one", "https://example.com/1")];
        let draft = fallback_draft(&items, &[], &GenerateOptions::default());
        assert!(draft.contains("### Trends to Watch"));
        assert!(draft.contains("- AI-assisted creation workflows"));
        assert!(draft.contains("- Platform algorithm shifts"));
        assert!(draft.contains("- Audience retention strategies"));
    }

    #[test]
    fn fallback_prefers_computed_trends_over_static_lines() {
        let items = vec![item("Only one", "https://example.com/1")];
        let trends = vec![("quantum".to_string(), 2.0)];
        let draft = fallback_draft(&items, &trends, &GenerateOptions::default());
        assert!(draft.contains("- quantum"));
        assert!(!draft.contains("AI-assisted creation workflows"));
    }
}
