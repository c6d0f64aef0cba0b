use crate::types::{
    BulkOperation, ContentItem, Draft, PulseError, Result, SaveOutcome, Source, WorkspaceMember,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Narrow contract over the relational store. One configured implementation
/// is constructed at startup and injected into every component.
#[async_trait]
pub trait Store: Send + Sync {
    /// Sources owned by `owner_id`, optionally narrowed to one workspace.
    async fn list_sources(&self, owner_id: Uuid, workspace_id: Option<Uuid>)
        -> Result<Vec<Source>>;

    /// Persist a batch of content items: bulk upsert where supported, with a
    /// per-row insert fallback that swallows (but counts) individual failures.
    /// Uniqueness is `(source_id, url, replica)`.
    async fn save_content_items(&self, rows: &[ContentItem]) -> Result<SaveOutcome>;

    /// Most recent content items for a user, newest first.
    async fn list_recent_content(&self, user_id: Uuid, limit: usize) -> Result<Vec<ContentItem>>;

    async fn save_draft(&self, user_id: Uuid, draft_text: &str) -> Result<Draft>;

    async fn latest_draft(&self, user_id: Uuid) -> Result<Option<Draft>>;

    async fn mark_draft_sent(&self, draft_id: Uuid) -> Result<()>;

    async fn workspace_members(&self, workspace_id: Uuid) -> Result<Vec<WorkspaceMember>>;

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn create_bulk_operation(&self, op: &BulkOperation) -> Result<()>;

    async fn get_bulk_operation(&self, id: Uuid) -> Result<Option<BulkOperation>>;

    /// Persist the operation's current status / progress / results snapshot.
    async fn update_bulk_operation(&self, op: &BulkOperation) -> Result<()>;
}

#[derive(Default)]
struct MemoryInner {
    sources: Vec<Source>,
    content: Vec<ContentItem>,
    content_keys: HashSet<(Uuid, String, u32)>,
    drafts: Vec<Draft>,
    members: HashMap<Uuid, Vec<WorkspaceMember>>,
    user_emails: HashMap<Uuid, String>,
    operations: HashMap<Uuid, BulkOperation>,
    /// Every persisted operation snapshot, oldest first. Lets tests verify
    /// that progress is durable between targets.
    operation_snapshots: Vec<BulkOperation>,
    /// Rows that should fail on individual insert, keyed by URL.
    poisoned_urls: HashSet<String>,
}

/// In-memory [`Store`] used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_source(&self, source: Source) {
        self.inner.lock().await.sources.push(source);
    }

    pub async fn add_member(&self, workspace_id: Uuid, user_id: Uuid) {
        self.inner
            .lock()
            .await
            .members
            .entry(workspace_id)
            .or_default()
            .push(WorkspaceMember {
                workspace_id,
                user_id,
            });
    }

    pub async fn add_user(&self, user_id: Uuid, email: &str) {
        self.inner
            .lock()
            .await
            .user_emails
            .insert(user_id, email.to_string());
    }

    /// Seed a content item directly, bypassing the dedup key (used to build
    /// trend windows with explicit timestamps).
    pub async fn push_content(&self, item: ContentItem) {
        self.inner.lock().await.content.push(item);
    }

    /// Make individual inserts of rows with this URL fail, to exercise the
    /// swallow-per-row path.
    pub async fn poison_url(&self, url: &str) {
        self.inner.lock().await.poisoned_urls.insert(url.to_string());
    }

    pub async fn content_count(&self) -> usize {
        self.inner.lock().await.content.len()
    }

    pub async fn draft_count(&self) -> usize {
        self.inner.lock().await.drafts.len()
    }

    pub async fn snapshot_count(&self, operation_id: Uuid) -> usize {
        self.inner
            .lock()
            .await
            .operation_snapshots
            .iter()
            .filter(|op| op.id == operation_id)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_sources(
        &self,
        owner_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<Source>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sources
            .iter()
            .filter(|s| {
                s.owner_id == owner_id
                    && (workspace_id.is_none() || s.workspace_id == workspace_id)
            })
            .cloned()
            .collect())
    }

    async fn save_content_items(&self, rows: &[ContentItem]) -> Result<SaveOutcome> {
        let mut inner = self.inner.lock().await;
        let mut failed_rows = 0usize;
        for row in rows {
            if inner.poisoned_urls.contains(&row.url) {
                debug!(url = %row.url, "swallowing failed content row");
                failed_rows += 1;
                continue;
            }
            let key = (row.source_id, row.url.clone(), row.replica);
            if inner.content_keys.insert(key) {
                inner.content.push(row.clone());
            }
        }
        Ok(SaveOutcome {
            attempted: rows.len(),
            failed_rows,
        })
    }

    async fn list_recent_content(&self, user_id: Uuid, limit: usize) -> Result<Vec<ContentItem>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<ContentItem> = inner
            .content
            .iter()
            .filter(|c| c.owner_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn save_draft(&self, user_id: Uuid, draft_text: &str) -> Result<Draft> {
        let draft = Draft {
            id: Uuid::new_v4(),
            user_id,
            draft_text: draft_text.to_string(),
            feedback: None,
            sent: false,
            created_at: Utc::now(),
        };
        self.inner.lock().await.drafts.push(draft.clone());
        Ok(draft)
    }

    async fn latest_draft(&self, user_id: Uuid) -> Result<Option<Draft>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .drafts
            .iter()
            .filter(|d| d.user_id == user_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn mark_draft_sent(&self, draft_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.drafts.iter_mut().find(|d| d.id == draft_id) {
            Some(draft) => {
                draft.sent = true;
                Ok(())
            }
            None => Err(PulseError::General(format!("draft not found: {draft_id}"))),
        }
    }

    async fn workspace_members(&self, workspace_id: Uuid) -> Result<Vec<WorkspaceMember>> {
        let inner = self.inner.lock().await;
        Ok(inner.members.get(&workspace_id).cloned().unwrap_or_default())
    }

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.inner.lock().await.user_emails.get(&user_id).cloned())
    }

    async fn create_bulk_operation(&self, op: &BulkOperation) -> Result<()> {
        self.inner.lock().await.operations.insert(op.id, op.clone());
        Ok(())
    }

    async fn get_bulk_operation(&self, id: Uuid) -> Result<Option<BulkOperation>> {
        Ok(self.inner.lock().await.operations.get(&id).cloned())
    }

    async fn update_bulk_operation(&self, op: &BulkOperation) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.operations.insert(op.id, op.clone());
        inner.operation_snapshots.push(op.clone());
        Ok(())
    }
}
