use crate::types::{FetchConfig, PulseError, Result};
use std::env;

/// Process-wide configuration, read once at startup and injected into the
/// components that need it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub resend_api_key: Option<String>,
    pub resend_from: String,
    pub storage_url: Option<String>,
    pub storage_key: Option<String>,
    pub tracking_base_url: String,
    /// Bounded worker count for bulk fan-out.
    pub bulk_concurrency: usize,
    pub fetch: FetchConfig,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env_opt("DATABASE_URL")
            .ok_or_else(|| PulseError::MissingCredential("DATABASE_URL".to_string()))?;

        let mut fetch = FetchConfig::default();
        if let Some(base) = env_opt("SCRAPE_API_BASE") {
            fetch.scrape_api_base = Some(base);
        }
        if let Some(secs) = env_opt("FETCH_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            fetch.timeout_seconds = secs;
        }

        Ok(Self {
            database_url,
            llm_api_key: env_opt("GROQ_API_KEY"),
            llm_base_url: env_opt("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            llm_model: env_opt("LLM_MODEL")
                .unwrap_or_else(|| "llama-3.1-8b-instant".to_string()),
            resend_api_key: env_opt("RESEND_API_KEY"),
            resend_from: env_opt("RESEND_FROM")
                .unwrap_or_else(|| "CreatorPulse <onboarding@resend.dev>".to_string()),
            storage_url: env_opt("STORAGE_URL"),
            storage_key: env_opt("STORAGE_KEY"),
            tracking_base_url: env_opt("TRACKING_BASE_URL")
                .unwrap_or_else(|| "https://api.creatorpulse.dev/track".to_string()),
            bulk_concurrency: env_opt("BULK_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(8),
            fetch,
        })
    }
}
