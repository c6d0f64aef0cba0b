use crate::fetcher::FetchItems;
use crate::store::Store;
use crate::types::{ContentItem, FetchReport, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Pulls every configured source for a user, applies boost replication, and
/// persists the results in one batch.
pub struct ContentAggregator {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FetchItems>,
}

impl ContentAggregator {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn FetchItems>) -> Self {
        Self { store, fetcher }
    }

    /// Number of copies a source's boost factor earns: the fractional part is
    /// dropped and anything below one clamps to a single copy.
    fn boost_copies(boost_factor: f32) -> u32 {
        (boost_factor.floor() as u32).max(1)
    }

    pub async fn fetch_all_sources(
        &self,
        user_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<FetchReport> {
        let sources = self.store.list_sources(user_id, workspace_id).await?;
        info!(%user_id, sources = sources.len(), "fetching configured sources");

        let now = Utc::now();
        let mut batch = Vec::new();
        for source in &sources {
            let items = self.fetcher.fetch(source).await;
            if items.is_empty() {
                warn!(source = %source.identifier, "source yielded no items");
                continue;
            }
            let copies = Self::boost_copies(source.boost_factor);
            for item in items {
                for replica in 0..copies {
                    batch.push(ContentItem {
                        id: Uuid::new_v4(),
                        owner_id: user_id,
                        source_id: source.id,
                        workspace_id,
                        title: item.title.clone(),
                        url: item.url.clone(),
                        summary: item.summary.clone(),
                        replica,
                        created_at: Some(now),
                    });
                }
            }
        }

        if batch.is_empty() {
            info!(%user_id, "no new content fetched");
            return Ok(FetchReport {
                saved: 0,
                failed_rows: 0,
            });
        }

        let outcome = self.store.save_content_items(&batch).await?;
        info!(
            %user_id,
            attempted = outcome.attempted,
            failed_rows = outcome.failed_rows,
            "content batch persisted"
        );
        Ok(FetchReport {
            saved: outcome.attempted,
            failed_rows: outcome.failed_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_copies_floor_and_clamp() {
        assert_eq!(ContentAggregator::boost_copies(2.4), 2);
        assert_eq!(ContentAggregator::boost_copies(1.0), 1);
        assert_eq!(ContentAggregator::boost_copies(0.3), 1);
        assert_eq!(ContentAggregator::boost_copies(0.0), 1);
        assert_eq!(ContentAggregator::boost_copies(3.999), 3);
    }
}
