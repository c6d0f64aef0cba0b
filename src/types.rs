use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of upstream feed a [`Source`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SocialFeed,
    VideoChannel,
    Rss,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SocialFeed => "social_feed",
            SourceKind::VideoChannel => "video_channel",
            SourceKind::Rss => "rss",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "social_feed" => Some(SourceKind::SocialFeed),
            "video_channel" => Some(SourceKind::VideoChannel),
            "rss" => Some(SourceKind::Rss),
            _ => None,
        }
    }
}

/// A configured upstream feed owned by a user, optionally scoped to a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub kind: SourceKind,
    pub identifier: String,
    /// Per-source multiplier in (0, 3]; items are replicated
    /// `max(1, floor(boost_factor))` times in the aggregated pool.
    pub boost_factor: f32,
}

/// A single candidate item produced by the fetcher, before it is tagged
/// with its source and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub title: String,
    pub url: String,
    pub summary: String,
}

/// A persisted content item. `replica` is the boost-replication ordinal;
/// `(source_id, url, replica)` is the storage uniqueness key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub replica: u32,
    pub created_at: Option<DateTime<Utc>>,
}

/// An ephemeral trending term with its spike score. Never persisted.
pub type TrendTerm = (String, f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub draft_text: String,
    pub feedback: Option<String>,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SourceFetch,
    DraftGenerate,
    NewsletterSend,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SourceFetch => "source_fetch",
            OperationKind::DraftGenerate => "draft_generate",
            OperationKind::NewsletterSend => "newsletter_send",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    /// Position in the forward-only lifecycle; transitions never lower it.
    fn rank(&self) -> u8 {
        match self {
            OperationStatus::Pending => 0,
            OperationStatus::Running => 1,
            OperationStatus::Completed => 2,
            OperationStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Progress {
    /// Fraction of targets that succeeded. An operation can finish as
    /// `completed` with every target failed; callers that care inspect this.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Kind-specific payload of a successful target step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDetail {
    ItemsFetched {
        items_fetched: usize,
        failed_rows: usize,
    },
    DraftGenerated {
        draft_generated: bool,
        length: usize,
    },
    EmailSent {
        email_sent: bool,
        recipient: String,
    },
}

/// Outcome for one target workspace. Write-once per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetResult {
    Success {
        #[serde(flatten)]
        detail: TargetDetail,
    },
    Failed {
        error: String,
    },
}

impl TargetResult {
    pub fn failed(error: impl Into<String>) -> Self {
        TargetResult::Failed { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetResult::Success { .. })
    }
}

/// A durable fan-out job applying one workflow across many target workspaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: OperationKind,
    pub target_workspaces: Vec<Uuid>,
    pub status: OperationStatus,
    pub progress: Progress,
    pub results: HashMap<Uuid, TargetResult>,
    pub error_message: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperation {
    pub fn new(
        kind: OperationKind,
        workspace_id: Uuid,
        target_workspaces: Vec<Uuid>,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            kind,
            progress: Progress {
                total: target_workspaces.len(),
                ..Progress::default()
            },
            target_workspaces,
            status: OperationStatus::Pending,
            results: HashMap::new(),
            error_message: None,
            created_by,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Advance the status. Transitions only move forward; a regressing update
    /// is ignored so a terminal operation can never be rewritten to `running`.
    pub fn advance_status(&mut self, next: OperationStatus) {
        if next.rank() < self.status.rank() || self.status.is_terminal() {
            tracing::warn!(
                operation = %self.id,
                from = ?self.status,
                to = ?next,
                "ignoring status regression"
            );
            return;
        }
        if next == OperationStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self.status = next;
    }

    /// Record a target outcome. The first write wins so no worker can
    /// overwrite another target's result.
    pub fn record_target(&mut self, workspace_id: Uuid, result: TargetResult) {
        if self.results.contains_key(&workspace_id) {
            tracing::warn!(operation = %self.id, target = %workspace_id, "duplicate target result ignored");
            return;
        }
        if result.is_success() {
            self.progress.completed += 1;
        } else {
            self.progress.failed += 1;
        }
        self.results.insert(workspace_id, result);
    }
}

/// Outcome of persisting one aggregated batch of content items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Rows attempted, including ones that later failed individually.
    pub attempted: usize,
    /// Rows that failed to persist individually and were swallowed.
    pub failed_rows: usize,
}

/// Report returned by the aggregator for one (user, workspace) scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub saved: usize,
    pub failed_rows: usize,
}

/// Settings for the source fetcher's HTTP client and fallback chains.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Hard cap on items returned per source.
    pub max_items: usize,
    /// Base URL of the native social scraping API. When unset, the primary
    /// social tier is skipped and the mirror tiers take over.
    pub scrape_api_base: Option<String>,
    /// RSS-bridge mirrors, tried in priority order.
    pub mirror_hosts: Vec<String>,
    /// Readability proxy prefixed to mirror URLs in the last-resort tier.
    pub readability_proxy: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "CreatorPulse/0.1".to_string(),
            timeout_seconds: 10,
            max_items: 10,
            scrape_api_base: None,
            mirror_hosts: vec![
                "nitter.net".to_string(),
                "nitter.poast.org".to_string(),
                "nitter.fdn.fr".to_string(),
                "ntrqq.com".to_string(),
            ],
            readability_proxy: "https://r.jina.ai".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation not found: {id}")]
    OperationNotFound { id: Uuid },

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Email delivery failed ({status}): {message}")]
    Mail { status: u16, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;
