use crate::types::{PulseError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of one completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// Trait for text-completion backends that turn a prompt into a draft.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn client_name(&self) -> String;

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

/// OpenAI-compatible chat-completions client.
pub struct HttpCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpCompletionClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    fn client_name(&self) -> String {
        format!("http ({})", self.model)
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PulseError::General(format!(
                "completion service returned HTTP {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PulseError::General("completion response had no choices".to_string()))?;

        debug!(tokens = parsed.usage.total_tokens, "completion succeeded");
        Ok(Completion {
            text,
            tokens_used: parsed.usage.total_tokens,
        })
    }
}

/// Scripted completion client for tests: fails the first `fail_first` calls,
/// then returns the canned response. Tracks how many calls were made.
pub struct MockCompletionClient {
    response: String,
    fail_first: usize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail_first: 0,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// A client that never succeeds.
    pub fn always_failing() -> Self {
        Self::new("").failing_first(usize::MAX)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().await.last().cloned()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn client_name(&self) -> String {
        "mock".to_string()
    }

    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<Completion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(prompt.to_string());
        if call < self.fail_first {
            return Err(PulseError::General("simulated completion outage".to_string()));
        }
        Ok(Completion {
            text: self.response.clone(),
            tokens_used: self.response.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_fails_then_recovers() {
        let client = MockCompletionClient::new("draft text").failing_first(2);
        assert!(client.complete("p", 0.7).await.is_err());
        assert!(client.complete("p", 0.7).await.is_err());
        let completion = client.complete("p", 0.7).await.unwrap();
        assert_eq!(completion.text, "draft text");
        assert_eq!(client.call_count(), 3);
    }
}
