use async_trait::async_trait;
use chrono::Utc;
use creator_pulse::{
    BulkOperations, ContentAggregator, ContentItem, DraftPipeline, ExecuteParams, FetchItems,
    FetchedItem, Mailer, MemoryStore, MemoryStyleStore, MockMailer, OperationKind, OperationStatus,
    Source, SourceKind, Store, TargetDetail, TargetResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

struct StubFetcher {
    by_identifier: HashMap<String, Vec<FetchedItem>>,
}

#[async_trait]
impl FetchItems for StubFetcher {
    async fn fetch(&self, source: &Source) -> Vec<FetchedItem> {
        self.by_identifier
            .get(&source.identifier)
            .cloned()
            .unwrap_or_default()
    }
}

/// Mailer whose send never finishes: it announces that it started, then
/// parks forever so only cancellation can unblock the target.
struct StallingMailer {
    started: Arc<Notify>,
}

#[async_trait]
impl Mailer for StallingMailer {
    async fn send(&self, _to: &str, _subject: &str, _html: &str) -> creator_pulse::Result<()> {
        self.started.notify_one();
        std::future::pending().await
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    mailer: Arc<MockMailer>,
    bulk: BulkOperations,
}

fn harness_with(mailer: MockMailer, items: HashMap<String, Vec<FetchedItem>>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(mailer);
    let fetcher = Arc::new(StubFetcher {
        by_identifier: items,
    });
    let aggregator = Arc::new(ContentAggregator::new(store.clone(), fetcher));
    let drafts = Arc::new(DraftPipeline::new(
        store.clone(),
        Arc::new(MemoryStyleStore::new()),
        None,
    ));
    let bulk = BulkOperations::new(
        store.clone(),
        aggregator,
        drafts,
        mailer.clone(),
        "https://track.example".to_string(),
        4,
    );
    Harness {
        store,
        mailer,
        bulk,
    }
}

fn harness() -> Harness {
    harness_with(MockMailer::new(), HashMap::new())
}

/// Workspace with one member who has an email address.
async fn member_workspace(store: &MemoryStore, email: &str) -> (Uuid, Uuid) {
    let workspace = Uuid::new_v4();
    let user = Uuid::new_v4();
    store.add_member(workspace, user).await;
    store.add_user(user, email).await;
    (workspace, user)
}

#[tokio::test]
async fn send_isolates_a_memberless_target() {
    let h = harness();
    let (ws_a, user_a) = member_workspace(&h.store, "a@example.com").await;
    let ws_b = Uuid::new_v4(); // no members
    let (ws_c, user_c) = member_workspace(&h.store, "c@example.com").await;
    h.store.save_draft(user_a, "### Intro\n\nhello a").await.unwrap();
    h.store.save_draft(user_c, "### Intro\n\nhello c").await.unwrap();

    let summary = h
        .bulk
        .run_bulk_send(Uuid::new_v4(), vec![ws_a, ws_b, ws_c], Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.progress.total, 3);
    assert_eq!(summary.progress.completed, 2);
    assert_eq!(summary.progress.failed, 1);
    assert_eq!(
        summary.results[&ws_b],
        TargetResult::failed("No members found")
    );

    let sent = h.mailer.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.subject == "Your CreatorPulse Draft"));
    let recipients: Vec<_> = sent.iter().map(|m| m.to.as_str()).collect();
    assert!(recipients.contains(&"a@example.com"));
    assert!(recipients.contains(&"c@example.com"));
    assert!(h.store.latest_draft(user_a).await.unwrap().unwrap().sent);
}

#[tokio::test]
async fn progress_is_snapshotted_per_target() {
    let h = harness();
    let mut targets = Vec::new();
    for i in 0..3 {
        let (ws, user) = member_workspace(&h.store, &format!("u{i}@example.com")).await;
        h.store.save_draft(user, "body").await.unwrap();
        targets.push(ws);
    }

    let op = h
        .bulk
        .create_operation(
            OperationKind::NewsletterSend,
            Uuid::new_v4(),
            targets,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    h.bulk.execute(op.id, ExecuteParams::default()).await.unwrap();

    // one running snapshot + one per target + the terminal snapshot
    assert_eq!(h.store.snapshot_count(op.id).await, 5);
}

#[tokio::test]
async fn cancelled_operation_lands_terminal_with_full_results() {
    let h = harness();
    let (ws_a, user_a) = member_workspace(&h.store, "a@example.com").await;
    let (ws_b, _) = member_workspace(&h.store, "b@example.com").await;
    h.store.save_draft(user_a, "body").await.unwrap();

    let op = h
        .bulk
        .create_operation(
            OperationKind::NewsletterSend,
            Uuid::new_v4(),
            vec![ws_a, ws_b],
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let (_tx, cancel) = watch::channel(true);
    let summary = h
        .bulk
        .execute_with_cancel(op.id, ExecuteParams::default(), cancel)
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Failed);
    assert_eq!(summary.progress.failed, 2);
    assert_eq!(summary.results.len(), 2);
    assert!(summary
        .results
        .values()
        .all(|r| *r == TargetResult::failed("operation cancelled")));
    assert!(h.mailer.sent().await.is_empty());

    let stored = h.store.get_bulk_operation(op.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("operation cancelled"));
}

#[tokio::test]
async fn cancellation_interrupts_an_in_flight_target() {
    let store = Arc::new(MemoryStore::new());
    let started = Arc::new(Notify::new());
    let mailer = Arc::new(StallingMailer {
        started: started.clone(),
    });
    let fetcher = Arc::new(StubFetcher {
        by_identifier: HashMap::new(),
    });
    let aggregator = Arc::new(ContentAggregator::new(store.clone(), fetcher));
    let drafts = Arc::new(DraftPipeline::new(
        store.clone(),
        Arc::new(MemoryStyleStore::new()),
        None,
    ));
    let bulk = BulkOperations::new(
        store.clone(),
        aggregator,
        drafts,
        mailer,
        "https://track.example".to_string(),
        4,
    );

    let (workspace, user) = member_workspace(&store, "a@example.com").await;
    store.save_draft(user, "body").await.unwrap();
    let op = bulk
        .create_operation(
            OperationKind::NewsletterSend,
            Uuid::new_v4(),
            vec![workspace],
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let (tx, cancel) = watch::channel(false);
    let run = {
        let bulk = bulk.clone();
        tokio::spawn(async move {
            bulk.execute_with_cancel(op.id, ExecuteParams::default(), cancel)
                .await
        })
    };

    // Cancel only once the send step is blocked inside the mailer.
    started.notified().await;
    tx.send(true).unwrap();

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.status, OperationStatus::Failed);
    assert_eq!(
        summary.results[&workspace],
        TargetResult::failed("operation cancelled")
    );
}

#[tokio::test]
async fn all_targets_failing_still_completes() {
    let h = harness();
    // members exist but nobody has a draft to send
    let (ws_a, _) = member_workspace(&h.store, "a@example.com").await;
    let (ws_b, _) = member_workspace(&h.store, "b@example.com").await;

    let summary = h
        .bulk
        .run_bulk_send(Uuid::new_v4(), vec![ws_a, ws_b], Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(summary.progress.failed, 2);
    assert_eq!(summary.progress.success_rate(), 0.0);
    assert!(summary
        .results
        .values()
        .all(|r| *r == TargetResult::failed("No draft found")));
}

#[tokio::test]
async fn fetch_operation_records_item_counts() {
    let mut items = HashMap::new();
    items.insert(
        "blog".to_string(),
        vec![FetchedItem {
            title: "Post".to_string(),
            url: "https://blog.example/1".to_string(),
            summary: String::new(),
        }],
    );
    let h = harness_with(MockMailer::new(), items);
    let (ws, user) = member_workspace(&h.store, "a@example.com").await;
    h.store
        .add_source(Source {
            id: Uuid::new_v4(),
            owner_id: user,
            workspace_id: Some(ws),
            kind: SourceKind::Rss,
            identifier: "blog".to_string(),
            boost_factor: 2.0,
        })
        .await;

    let summary = h
        .bulk
        .run_bulk_fetch(Uuid::new_v4(), vec![ws], Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    match &summary.results[&ws] {
        TargetResult::Success {
            detail: TargetDetail::ItemsFetched { items_fetched, failed_rows },
        } => {
            assert_eq!(*items_fetched, 2);
            assert_eq!(*failed_rows, 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn generate_operation_records_draft_shape() {
    let h = harness();
    let (ws, user) = member_workspace(&h.store, "a@example.com").await;
    h.store
        .push_content(ContentItem {
            id: Uuid::new_v4(),
            owner_id: user,
            source_id: Uuid::new_v4(),
            workspace_id: Some(ws),
            title: "Big story".to_string(),
            url: "https://example.com/big".to_string(),
            summary: String::new(),
            replica: 0,
            created_at: Some(Utc::now()),
        })
        .await;

    let summary = h
        .bulk
        .run_bulk_generate(
            Uuid::new_v4(),
            vec![ws],
            Uuid::new_v4(),
            ExecuteParams::default(),
        )
        .await
        .unwrap();

    match &summary.results[&ws] {
        TargetResult::Success {
            detail: TargetDetail::DraftGenerated { draft_generated, length },
        } => {
            assert!(*draft_generated);
            assert!(*length > 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(h.store.draft_count().await, 1);
}

#[tokio::test]
async fn member_without_email_fails_that_target_only() {
    let h = harness();
    let workspace = Uuid::new_v4();
    let user = Uuid::new_v4();
    h.store.add_member(workspace, user).await; // no email on file
    h.store.save_draft(user, "body").await.unwrap();

    let summary = h
        .bulk
        .run_bulk_send(Uuid::new_v4(), vec![workspace], Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(summary.status, OperationStatus::Completed);
    assert_eq!(
        summary.results[&workspace],
        TargetResult::failed("No email address found")
    );
}

#[tokio::test]
async fn executing_a_finished_operation_is_rejected() {
    let h = harness();
    let (ws, user) = member_workspace(&h.store, "a@example.com").await;
    h.store.save_draft(user, "body").await.unwrap();

    let op = h
        .bulk
        .create_operation(
            OperationKind::NewsletterSend,
            Uuid::new_v4(),
            vec![ws],
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    h.bulk.execute(op.id, ExecuteParams::default()).await.unwrap();

    assert!(h.bulk.execute(op.id, ExecuteParams::default()).await.is_err());
}
