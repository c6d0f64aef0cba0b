use crate::types::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// How many uploaded samples feed the prompt, and how much of each.
pub const MAX_SAMPLES: usize = 3;
pub const SAMPLE_CHAR_BUDGET: usize = 6000;

/// Source of a user's uploaded writing samples.
#[async_trait]
pub trait StyleStore: Send + Sync {
    /// Up to [`MAX_SAMPLES`] samples, each truncated to [`SAMPLE_CHAR_BUDGET`]
    /// characters. A user with no samples gets an empty list, not an error.
    async fn style_samples(&self, user_id: Uuid) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Reads samples from an object-store bucket over its REST API. Objects live
/// under a per-user prefix in the `style-samples` bucket.
pub struct BucketStyleStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BucketStyleStore {
    const BUCKET: &'static str = "style-samples";

    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn list_objects(&self, user_id: Uuid) -> Result<Vec<String>> {
        let url = format!("{}/object/list/{}", self.base_url, Self::BUCKET);
        let body = serde_json::json!({
            "prefix": format!("{user_id}/"),
            "limit": MAX_SAMPLES,
            "sortBy": { "column": "created_at", "order": "desc" },
        });
        let entries: Vec<ObjectEntry> = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| format!("{user_id}/{}", e.name))
            .collect())
    }

    async fn download(&self, path: &str) -> Result<String> {
        let url = format!("{}/object/{}/{}", self.base_url, Self::BUCKET, path);
        let text = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

#[async_trait]
impl StyleStore for BucketStyleStore {
    async fn style_samples(&self, user_id: Uuid) -> Result<Vec<String>> {
        let paths = self.list_objects(user_id).await?;
        debug!(%user_id, count = paths.len(), "listed style samples");

        let mut samples = Vec::new();
        for path in paths.iter().take(MAX_SAMPLES) {
            match self.download(path).await {
                Ok(text) if !text.trim().is_empty() => {
                    samples.push(truncate_chars(&text, SAMPLE_CHAR_BUDGET));
                }
                Ok(_) => debug!(path, "skipping empty style sample"),
                Err(e) => warn!(path, error = %e, "style sample download failed"),
            }
        }
        Ok(samples)
    }
}

/// In-memory style store for tests and offline runs.
#[derive(Default)]
pub struct MemoryStyleStore {
    samples: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl MemoryStyleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_sample(&self, user_id: Uuid, text: &str) {
        self.samples
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .push(text.to_string());
    }
}

#[async_trait]
impl StyleStore for MemoryStyleStore {
    async fn style_samples(&self, user_id: Uuid) -> Result<Vec<String>> {
        let samples = self.samples.lock().await;
        Ok(samples
            .get(&user_id)
            .map(|v| {
                v.iter()
                    .take(MAX_SAMPLES)
                    .map(|s| truncate_chars(s, SAMPLE_CHAR_BUDGET))
                    .collect()
            })
            .unwrap_or_default())
    }
}
