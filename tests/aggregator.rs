use async_trait::async_trait;
use creator_pulse::{
    ContentAggregator, FetchItems, FetchedItem, MemoryStore, Source, SourceKind,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Fetcher stub that serves canned items per source identifier.
struct StubFetcher {
    by_identifier: HashMap<String, Vec<FetchedItem>>,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            by_identifier: HashMap::new(),
        }
    }

    fn with(mut self, identifier: &str, items: Vec<FetchedItem>) -> Self {
        self.by_identifier.insert(identifier.to_string(), items);
        self
    }
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

fn source(owner: Uuid, workspace: Option<Uuid>, kind: SourceKind, identifier: &str, boost: f32) -> Source {
    Source {
        id: Uuid::new_v4(),
        owner_id: owner,
        workspace_id: workspace,
        kind,
        identifier: identifier.to_string(),
        boost_factor: boost,
    }
}

fn item(title: &str, url: &str) -> FetchedItem {
    FetchedItem {
        title: title.to_string(),
        url: url.to_string(),
        summary: String::new(),
    }
}

#[tokio::test]
async fn boosted_source_items_are_replicated() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    store
        .add_source(source(owner, None, SourceKind::Rss, "blog", 2.4))
        .await;
    let fetcher = Arc::new(StubFetcher::new().with("blog", vec![item("Post", "https://blog.example/1")]));

    let aggregator = ContentAggregator::new(store.clone(), fetcher);
    let report = aggregator.fetch_all_sources(owner, None).await.unwrap();

    // floor(2.4) = 2 copies of the single item
    assert_eq!(report.saved, 2);
    assert_eq!(report.failed_rows, 0);
    assert_eq!(store.content_count().await, 2);
}

#[tokio::test]
async fn merges_items_across_sources() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    let workspace = Uuid::new_v4();
    store
        .add_source(source(owner, Some(workspace), SourceKind::Rss, "blog", 1.0))
        .await;
    store
        .add_source(source(owner, Some(workspace), SourceKind::SocialFeed, "@jane", 1.0))
        .await;
    let fetcher = Arc::new(
        StubFetcher::new()
            .with(
                "blog",
                vec![
                    item("A", "https://blog.example/a"),
                    item("B", "https://blog.example/b"),
                    item("C", "https://blog.example/c"),
                ],
            )
            .with(
                "@jane",
                vec![
                    item("P1", "https://x.com/jane/status/1"),
                    item("P2", "https://x.com/jane/status/2"),
                ],
            ),
    );

    let aggregator = ContentAggregator::new(store.clone(), fetcher);
    let report = aggregator
        .fetch_all_sources(owner, Some(workspace))
        .await
        .unwrap();

    assert_eq!(report.saved, 5);
    assert_eq!(store.content_count().await, 5);
}

#[tokio::test]
async fn repeated_runs_do_not_accumulate_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    store
        .add_source(source(owner, None, SourceKind::Rss, "blog", 2.0))
        .await;
    let fetcher = Arc::new(StubFetcher::new().with("blog", vec![item("Post", "https://blog.example/1")]));

    let aggregator = ContentAggregator::new(store.clone(), fetcher);
    aggregator.fetch_all_sources(owner, None).await.unwrap();
    let second = aggregator.fetch_all_sources(owner, None).await.unwrap();

    // The second run attempts the same rows but the store keeps one copy per
    // (source, url, replica) key.
    assert_eq!(second.saved, 2);
    assert_eq!(store.content_count().await, 2);
}

#[tokio::test]
async fn bad_rows_are_swallowed_without_blocking_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    store
        .add_source(source(owner, None, SourceKind::Rss, "blog", 1.0))
        .await;
    store.poison_url("https://blog.example/bad").await;
    let fetcher = Arc::new(StubFetcher::new().with(
        "blog",
        vec![
            item("Good", "https://blog.example/good"),
            item("Bad", "https://blog.example/bad"),
        ],
    ));

    let aggregator = ContentAggregator::new(store.clone(), fetcher);
    let report = aggregator.fetch_all_sources(owner, None).await.unwrap();

    assert_eq!(report.saved, 2);
    assert_eq!(report.failed_rows, 1);
    assert_eq!(store.content_count().await, 1);
}

#[tokio::test]
async fn empty_scope_reports_zero() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = ContentAggregator::new(store.clone(), Arc::new(StubFetcher::new()));
    let report = aggregator
        .fetch_all_sources(Uuid::new_v4(), None)
        .await
        .unwrap();
    assert_eq!(report.saved, 0);
    assert_eq!(store.content_count().await, 0);
}
