use crate::store::Store;
use crate::types::{
    BulkOperation, ContentItem, Draft, OperationKind, OperationStatus, Progress, PulseError,
    Result, SaveOutcome, Source, SourceKind, TargetResult, WorkspaceMember,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// PostgreSQL-backed [`Store`]. Connect once at startup and share the pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        info!("connected to database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode_source(row: &PgRow) -> Result<Source> {
        let kind_raw: String = row.try_get("kind")?;
        let kind = SourceKind::parse(&kind_raw)
            .ok_or_else(|| PulseError::General(format!("unknown source kind: {kind_raw}")))?;
        Ok(Source {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            workspace_id: row.try_get("workspace_id")?,
            kind,
            identifier: row.try_get("identifier")?,
            boost_factor: row.try_get::<f64, _>("boost_factor")? as f32,
        })
    }

    fn decode_content_item(row: &PgRow) -> Result<ContentItem> {
        Ok(ContentItem {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            source_id: row.try_get("source_id")?,
            workspace_id: row.try_get("workspace_id")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            summary: row.try_get::<Option<String>, _>("summary")?.unwrap_or_default(),
            replica: row.try_get::<i32, _>("replica")? as u32,
            // Rows written through the per-row fallback may lack a timestamp;
            // the trend engine folds those into the baseline window.
            created_at: row.try_get::<Option<DateTime<Utc>>, _>("created_at")?,
        })
    }

    fn decode_draft(row: &PgRow) -> Result<Draft> {
        Ok(Draft {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            draft_text: row.try_get("draft_text")?,
            feedback: row.try_get("feedback")?,
            sent: row.try_get("sent")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn decode_operation(row: &PgRow) -> Result<BulkOperation> {
        let kind_raw: String = row.try_get("kind")?;
        let kind: OperationKind = serde_json::from_value(serde_json::Value::String(kind_raw))?;
        let status_raw: String = row.try_get("status")?;
        let status: OperationStatus =
            serde_json::from_value(serde_json::Value::String(status_raw))?;
        let targets: serde_json::Value = row.try_get("target_workspaces")?;
        let progress: serde_json::Value = row.try_get("progress")?;
        let results: serde_json::Value = row.try_get("results")?;
        Ok(BulkOperation {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            kind,
            target_workspaces: serde_json::from_value(targets)?,
            status,
            progress: serde_json::from_value::<Progress>(progress)?,
            results: serde_json::from_value::<HashMap<Uuid, TargetResult>>(results)?,
            error_message: row.try_get("error_message")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn insert_single_row(&self, row: &ContentItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_items (id, owner_id, source_id, workspace_id, title, url, summary, replica, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_id, url, replica) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(row.owner_id)
        .bind(row.source_id)
        .bind(row.workspace_id)
        .bind(&row.title)
        .bind(&row.url)
        .bind(&row.summary)
        .bind(row.replica as i32)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_sources(
        &self,
        owner_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<Source>> {
        let rows = match workspace_id {
            Some(ws) => {
                sqlx::query(
                    "SELECT * FROM sources WHERE owner_id = $1 AND workspace_id = $2 ORDER BY created_at",
                )
                .bind(owner_id)
                .bind(ws)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM sources WHERE owner_id = $1 ORDER BY created_at")
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::decode_source).collect()
    }

    async fn save_content_items(&self, rows: &[ContentItem]) -> Result<SaveOutcome> {
        if rows.is_empty() {
            return Ok(SaveOutcome::default());
        }

        // Preferred path: one multi-row upsert.
        let mut builder = QueryBuilder::new(
            "INSERT INTO content_items (id, owner_id, source_id, workspace_id, title, url, summary, replica, created_at) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.owner_id)
                .push_bind(row.source_id)
                .push_bind(row.workspace_id)
                .push_bind(&row.title)
                .push_bind(&row.url)
                .push_bind(&row.summary)
                .push_bind(row.replica as i32)
                .push_bind(row.created_at);
        });
        builder.push(" ON CONFLICT (source_id, url, replica) DO NOTHING");

        match builder.build().execute(&self.pool).await {
            Ok(_) => Ok(SaveOutcome {
                attempted: rows.len(),
                failed_rows: 0,
            }),
            Err(e) => {
                // Bulk upsert unavailable. Insert row by row and swallow
                // individual failures so one bad row doesn't block the rest.
                warn!(error = %e, "bulk upsert failed, falling back to per-row inserts");
                let mut failed_rows = 0usize;
                for row in rows {
                    if let Err(e) = self.insert_single_row(row).await {
                        debug!(url = %row.url, error = %e, "swallowing failed content row");
                        failed_rows += 1;
                    }
                }
                if failed_rows > 0 {
                    warn!(failed_rows, attempted = rows.len(), "some content rows were not persisted");
                }
                Ok(SaveOutcome {
                    attempted: rows.len(),
                    failed_rows,
                })
            }
        }
    }

    async fn list_recent_content(&self, user_id: Uuid, limit: usize) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query(
            "SELECT * FROM content_items WHERE owner_id = $1 ORDER BY created_at DESC NULLS LAST LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode_content_item).collect()
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
        sqlx::query(
            "INSERT INTO drafts (id, user_id, draft_text, feedback, sent, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(draft.id)
        .bind(draft.user_id)
        .bind(&draft.draft_text)
        .bind(&draft.feedback)
        .bind(draft.sent)
        .bind(draft.created_at)
        .execute(&self.pool)
        .await?;
        Ok(draft)
    }

    async fn latest_draft(&self, user_id: Uuid) -> Result<Option<Draft>> {
        let row = sqlx::query(
            "SELECT * FROM drafts WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode_draft).transpose()
    }

    async fn mark_draft_sent(&self, draft_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE drafts SET sent = true WHERE id = $1")
            .bind(draft_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn workspace_members(&self, workspace_id: Uuid) -> Result<Vec<WorkspaceMember>> {
        let rows = sqlx::query(
            "SELECT workspace_id, user_id FROM workspace_members WHERE workspace_id = $1 ORDER BY joined_at",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        let mut members = Vec::with_capacity(rows.len());
        for row in &rows {
            members.push(WorkspaceMember {
                workspace_id: row.try_get("workspace_id")?,
                user_id: row.try_get("user_id")?,
            });
        }
        Ok(members)
    }

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("email")?),
            None => None,
        })
    }

    async fn create_bulk_operation(&self, op: &BulkOperation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bulk_operations
                (id, workspace_id, kind, target_workspaces, status, progress, results, error_message, created_by, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(op.id)
        .bind(op.workspace_id)
        .bind(op.kind.as_str())
        .bind(serde_json::to_value(&op.target_workspaces)?)
        .bind(op.status.as_str())
        .bind(serde_json::to_value(op.progress)?)
        .bind(serde_json::to_value(&op.results)?)
        .bind(&op.error_message)
        .bind(op.created_by)
        .bind(op.created_at)
        .bind(op.started_at)
        .bind(op.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_bulk_operation(&self, id: Uuid) -> Result<Option<BulkOperation>> {
        let row = sqlx::query("SELECT * FROM bulk_operations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_operation).transpose()
    }

    async fn update_bulk_operation(&self, op: &BulkOperation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_operations
            SET status = $2, progress = $3, results = $4, error_message = $5, started_at = $6, completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(op.id)
        .bind(op.status.as_str())
        .bind(serde_json::to_value(op.progress)?)
        .bind(serde_json::to_value(&op.results)?)
        .bind(&op.error_message)
        .bind(op.started_at)
        .bind(op.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
