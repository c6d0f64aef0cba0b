use anyhow::Result;
use clap::{Parser, Subcommand};
use creator_pulse::{
    AppConfig, BulkOperations, BulkSummary, CompletionClient, ContentAggregator, DisabledMailer,
    DraftPipeline, ExecuteParams, HttpCompletionClient, Mailer, MemoryStyleStore, OperationStatus,
    PgStore, ResendMailer, SourceFetcher, BucketStyleStore, StyleStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "creator-pulse")]
#[command(about = "Run content-curation workflows across tenant workspaces")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Args)]
struct TargetArgs {
    /// Workspace the operation is created under
    #[arg(long)]
    workspace_id: Uuid,

    /// Comma-separated list of target workspace IDs
    #[arg(long, value_delimiter = ',', required = true)]
    target_workspaces: Vec<Uuid>,

    /// User recorded as the operation's creator
    #[arg(long)]
    created_by: Uuid,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch configured sources for every target workspace
    Fetch {
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Generate a newsletter draft for every target workspace
    Generate {
        #[command(flatten)]
        targets: TargetArgs,

        /// Sampling temperature passed to the completion service
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Number of curated links per draft
        #[arg(long, default_value_t = 5)]
        num_links: usize,
    },
    /// Send each target's latest draft to its first member
    Send {
        #[command(flatten)]
        targets: TargetArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    info!("connected to database");

    let fetcher = Arc::new(SourceFetcher::new(config.fetch.clone()));
    let aggregator = Arc::new(ContentAggregator::new(store.clone(), fetcher));

    let styles: Arc<dyn StyleStore> = match (&config.storage_url, &config.storage_key) {
        (Some(url), Some(key)) => Arc::new(BucketStyleStore::new(url.clone(), key.clone())),
        _ => {
            warn!("object store not configured, drafting without style samples");
            Arc::new(MemoryStyleStore::new())
        }
    };

    let llm: Option<Arc<dyn CompletionClient>> = config.llm_api_key.as_ref().map(|key| {
        Arc::new(HttpCompletionClient::new(
            config.llm_base_url.clone(),
            key.clone(),
            config.llm_model.clone(),
        )) as Arc<dyn CompletionClient>
    });
    if llm.is_none() {
        warn!("no completion credential configured, drafts will use the templated fallback");
    }

    let drafts = Arc::new(DraftPipeline::new(store.clone(), styles, llm));

    let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
        Some(key) => Arc::new(ResendMailer::new(key.clone(), config.resend_from.clone())),
        None => Arc::new(DisabledMailer),
    };

    let bulk = BulkOperations::new(
        store,
        aggregator,
        drafts,
        mailer,
        config.tracking_base_url.clone(),
        config.bulk_concurrency,
    );

    let summary = match args.command {
        Command::Fetch { targets } => {
            bulk.run_bulk_fetch(
                targets.workspace_id,
                targets.target_workspaces,
                targets.created_by,
            )
            .await?
        }
        Command::Generate {
            targets,
            temperature,
            num_links,
        } => {
            bulk.run_bulk_generate(
                targets.workspace_id,
                targets.target_workspaces,
                targets.created_by,
                ExecuteParams {
                    temperature,
                    num_links,
                },
            )
            .await?
        }
        Command::Send { targets } => {
            bulk.run_bulk_send(
                targets.workspace_id,
                targets.target_workspaces,
                targets.created_by,
            )
            .await?
        }
    };

    print_summary(&summary)?;
    std::process::exit(exit_code(&summary));
}

/// Zero only for a fully clean run; a failed operation or any failed
/// target is reported to the shell.
fn exit_code(summary: &BulkSummary) -> i32 {
    if summary.status == OperationStatus::Failed || summary.progress.failed > 0 {
        1
    } else {
        0
    }
}

fn print_summary(summary: &BulkSummary) -> Result<()> {
    println!(
        "operation {} finished: {} ({}/{} succeeded, {} failed)",
        summary.operation_id,
        summary.status.as_str(),
        summary.progress.completed,
        summary.progress.total,
        summary.progress.failed,
    );
    for (target, result) in &summary.results {
        println!("  {target}: {}", serde_json::to_string(result)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use creator_pulse::Progress;
    use std::collections::HashMap;

    fn summary(status: OperationStatus, completed: usize, failed: usize) -> BulkSummary {
        BulkSummary {
            operation_id: Uuid::new_v4(),
            status,
            progress: Progress {
                total: completed + failed,
                completed,
                failed,
            },
            results: HashMap::new(),
        }
    }

    #[test]
    fn clean_run_exits_zero() {
        assert_eq!(exit_code(&summary(OperationStatus::Completed, 3, 0)), 0);
    }

    #[test]
    fn any_failed_target_exits_nonzero() {
        assert_eq!(exit_code(&summary(OperationStatus::Completed, 2, 1)), 1);
    }

    #[test]
    fn failed_operation_exits_nonzero() {
        assert_eq!(exit_code(&summary(OperationStatus::Failed, 0, 2)), 1);
    }
}
