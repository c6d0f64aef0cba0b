pub mod aggregator;
pub mod bulk;
pub mod config;
pub mod drafts;
pub mod fetcher;
pub mod llm;
pub mod mailer;
pub mod parser;
pub mod pg_store;
pub mod render;
pub mod store;
pub mod styles;
pub mod trends;
pub mod types;

pub use aggregator::ContentAggregator;
pub use bulk::{BulkOperations, BulkSummary, ExecuteParams};
pub use config::AppConfig;
pub use drafts::{DraftPipeline, GenerateOptions};
pub use fetcher::{FetchItems, SourceFetcher};
pub use llm::{CompletionClient, HttpCompletionClient, MockCompletionClient};
pub use mailer::{DisabledMailer, Mailer, MockMailer, ResendMailer};
pub use pg_store::PgStore;
pub use store::{MemoryStore, Store};
pub use styles::{BucketStyleStore, MemoryStyleStore, StyleStore};
pub use trends::compute_trends;
pub use types::*;
