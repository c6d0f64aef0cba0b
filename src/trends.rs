use crate::types::{ContentItem, TrendTerm};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

const RECENT_WINDOW_HOURS: i64 = 48;
const BASELINE_WEIGHT: f64 = 0.5;
const MAX_TERMS: usize = 10;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "for", "to", "of", "in", "on", "at", "by", "with", "from",
    "is", "are", "was", "were", "be", "been", "being", "this", "that", "those", "these", "it",
    "its", "as", "about", "into", "your", "you", "our", "we", "their", "his", "her", "they", "i",
];

/// Lowercase, strip punctuation to spaces, then keep hashtags and words of
/// four or more characters that are not stopwords.
fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '#' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.starts_with('#') || w.len() >= 4)
        .filter(|w| !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Score terms by comparing the last 48 hours against everything older:
/// `score = recent_count - 0.5 * baseline_count`. Items with no usable
/// timestamp count toward the baseline. Only terms with a positive score
/// survive; at most ten are returned, highest first, ties broken
/// alphabetically so output is deterministic.
pub fn compute_trends(items: &[ContentItem], now: DateTime<Utc>) -> Vec<TrendTerm> {
    let recent_cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);

    let mut recent: HashMap<String, u32> = HashMap::new();
    let mut baseline: HashMap<String, u32> = HashMap::new();

    for item in items {
        // Everything that is not recent counts toward baseline, including
        // items past the nominal 7-day window and undated rows, so a term
        // with a long history cannot masquerade as a fresh spike.
        let bucket = match item.created_at {
            Some(ts) if ts >= recent_cutoff => &mut recent,
            _ => &mut baseline,
        };
        let text = format!("{} {}", item.title, item.summary);
        for token in tokenize(&text) {
            *bucket.entry(token).or_insert(0) += 1;
        }
    }

    let mut scored: Vec<TrendTerm> = recent
        .iter()
        .map(|(term, &count)| {
            let base = baseline.get(term).copied().unwrap_or(0);
            (
                term.clone(),
                f64::from(count) - BASELINE_WEIGHT * f64::from(base),
            )
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(MAX_TERMS);
    scored
}
