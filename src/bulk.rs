use crate::aggregator::ContentAggregator;
use crate::drafts::{DraftPipeline, GenerateOptions};
use crate::mailer::Mailer;
use crate::render::render_email_html;
use crate::store::Store;
use crate::types::{
    BulkOperation, OperationKind, OperationStatus, Progress, PulseError, Result, TargetDetail,
    TargetResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

const SEND_SUBJECT: &str = "Your CreatorPulse Draft";
const MAX_WORKERS: usize = 16;
const CANCELLED_MESSAGE: &str = "operation cancelled";

/// Resolves once the cancel flag flips to `true`. A dropped sender means the
/// operation can no longer be cancelled, so the future never resolves.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Caller-supplied knobs forwarded to the per-target step.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteParams {
    pub temperature: f32,
    pub num_links: usize,
}

impl Default for ExecuteParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_links: 5,
        }
    }
}

/// Final shape of a finished operation.
#[derive(Debug, Clone)]
pub struct BulkSummary {
    pub operation_id: Uuid,
    pub status: OperationStatus,
    pub progress: Progress,
    pub results: HashMap<Uuid, TargetResult>,
}

/// Fans one workflow out across many target workspaces. Targets run on a
/// bounded worker pool and are fully isolated: one target's failure is
/// recorded in its result slot and never aborts the others. Progress is
/// snapshotted to the store after every target so a crashed run leaves an
/// inspectable record.
#[derive(Clone)]
pub struct BulkOperations {
    store: Arc<dyn Store>,
    aggregator: Arc<ContentAggregator>,
    drafts: Arc<DraftPipeline>,
    mailer: Arc<dyn Mailer>,
    tracking_base_url: String,
    concurrency: usize,
}

impl BulkOperations {
    pub fn new(
        store: Arc<dyn Store>,
        aggregator: Arc<ContentAggregator>,
        drafts: Arc<DraftPipeline>,
        mailer: Arc<dyn Mailer>,
        tracking_base_url: String,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            aggregator,
            drafts,
            mailer,
            tracking_base_url,
            concurrency: concurrency.clamp(1, MAX_WORKERS),
        }
    }

    pub async fn create_operation(
        &self,
        kind: OperationKind,
        workspace_id: Uuid,
        targets: Vec<Uuid>,
        created_by: Uuid,
    ) -> Result<BulkOperation> {
        let op = BulkOperation::new(kind, workspace_id, targets, created_by);
        self.store.create_bulk_operation(&op).await?;
        info!(operation = %op.id, kind = kind.as_str(), targets = op.progress.total, "operation created");
        Ok(op)
    }

    pub async fn execute(&self, operation_id: Uuid, params: ExecuteParams) -> Result<BulkSummary> {
        let (_guard, cancel) = watch::channel(false);
        self.execute_with_cancel(operation_id, params, cancel).await
    }

    /// Execute with a cancellation signal. Flipping the watch value to `true`
    /// stops unstarted targets; each skipped target gets a failed result so
    /// the operation still lands in a terminal state with a full result map.
    pub async fn execute_with_cancel(
        &self,
        operation_id: Uuid,
        params: ExecuteParams,
        cancel: watch::Receiver<bool>,
    ) -> Result<BulkSummary> {
        let mut op = self
            .store
            .get_bulk_operation(operation_id)
            .await?
            .ok_or(PulseError::OperationNotFound { id: operation_id })?;

        if op.status != OperationStatus::Pending {
            return Err(PulseError::General(format!(
                "operation {operation_id} is {} and cannot be executed",
                op.status.as_str()
            )));
        }

        op.advance_status(OperationStatus::Running);
        self.store.update_bulk_operation(&op).await?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel(op.target_workspaces.len().max(1));

        for target in op.target_workspaces.clone() {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();
            let kind = op.kind;
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = if *cancel.borrow() {
                    TargetResult::failed(CANCELLED_MESSAGE)
                } else {
                    // An in-flight step is abandoned the moment the signal
                    // flips; the target still gets a recorded result.
                    tokio::select! {
                        result = worker.process_target(kind, target, params) => result,
                        _ = wait_cancelled(cancel) => TargetResult::failed(CANCELLED_MESSAGE),
                    }
                };
                let _ = tx.send((target, result)).await;
            });
        }
        drop(tx);

        while let Some((target, result)) = rx.recv().await {
            op.record_target(target, result);
            // Snapshot failures must not abort targets already in flight.
            if let Err(e) = self.store.update_bulk_operation(&op).await {
                warn!(operation = %op.id, error = %e, "progress snapshot failed");
            }
        }

        if *cancel.borrow() {
            op.error_message = Some(CANCELLED_MESSAGE.to_string());
            op.advance_status(OperationStatus::Failed);
        } else {
            op.advance_status(OperationStatus::Completed);
        }
        self.store.update_bulk_operation(&op).await?;

        info!(
            operation = %op.id,
            status = op.status.as_str(),
            completed = op.progress.completed,
            failed = op.progress.failed,
            "operation finished"
        );
        Ok(BulkSummary {
            operation_id: op.id,
            status: op.status,
            progress: op.progress,
            results: op.results,
        })
    }

    async fn process_target(
        &self,
        kind: OperationKind,
        target: Uuid,
        params: ExecuteParams,
    ) -> TargetResult {
        match self.run_target_step(kind, target, params).await {
            Ok(detail) => TargetResult::Success { detail },
            Err(error) => {
                warn!(%target, kind = kind.as_str(), error, "target step failed");
                TargetResult::Failed { error }
            }
        }
    }

    async fn run_target_step(
        &self,
        kind: OperationKind,
        target: Uuid,
        params: ExecuteParams,
    ) -> std::result::Result<TargetDetail, String> {
        let members = self
            .store
            .workspace_members(target)
            .await
            .map_err(|e| e.to_string())?;
        let member = members.first().ok_or("No members found")?;
        let user_id = member.user_id;

        match kind {
            OperationKind::SourceFetch => {
                let report = self
                    .aggregator
                    .fetch_all_sources(user_id, Some(target))
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(TargetDetail::ItemsFetched {
                    items_fetched: report.saved,
                    failed_rows: report.failed_rows,
                })
            }
            OperationKind::DraftGenerate => {
                let options = GenerateOptions {
                    temperature: params.temperature,
                    num_links: params.num_links,
                    ..GenerateOptions::default()
                };
                let text = self
                    .drafts
                    .generate_and_save_draft(user_id, None, &options)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(TargetDetail::DraftGenerated {
                    draft_generated: !text.is_empty(),
                    length: text.len(),
                })
            }
            OperationKind::NewsletterSend => {
                let email = self
                    .store
                    .user_email(user_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or("No email address found")?;
                let draft = self
                    .store
                    .latest_draft(user_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or("No draft found")?;
                if draft.draft_text.trim().is_empty() {
                    return Err("Draft is empty".to_string());
                }
                let html = render_email_html(&draft, &self.tracking_base_url);
                self.mailer
                    .send(&email, SEND_SUBJECT, &html)
                    .await
                    .map_err(|e| e.to_string())?;
                self.store
                    .mark_draft_sent(draft.id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(TargetDetail::EmailSent {
                    email_sent: true,
                    recipient: email,
                })
            }
        }
    }

    pub async fn run_bulk_fetch(
        &self,
        workspace_id: Uuid,
        targets: Vec<Uuid>,
        created_by: Uuid,
    ) -> Result<BulkSummary> {
        let op = self
            .create_operation(OperationKind::SourceFetch, workspace_id, targets, created_by)
            .await?;
        self.execute(op.id, ExecuteParams::default()).await
    }

    pub async fn run_bulk_generate(
        &self,
        workspace_id: Uuid,
        targets: Vec<Uuid>,
        created_by: Uuid,
        params: ExecuteParams,
    ) -> Result<BulkSummary> {
        let op = self
            .create_operation(OperationKind::DraftGenerate, workspace_id, targets, created_by)
            .await?;
        self.execute(op.id, params).await
    }

    pub async fn run_bulk_send(
        &self,
        workspace_id: Uuid,
        targets: Vec<Uuid>,
        created_by: Uuid,
    ) -> Result<BulkSummary> {
        let op = self
            .create_operation(OperationKind::NewsletterSend, workspace_id, targets, created_by)
            .await?;
        self.execute(op.id, ExecuteParams::default()).await
    }
}
