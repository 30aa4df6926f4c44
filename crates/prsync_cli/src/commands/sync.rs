//! The sync command: build the access stack and run the orchestrator.

use std::sync::Arc;
use std::time::Instant;

use console::style;
use sea_orm::DatabaseConnection;

use prsync::access::{AccessConfig, AccessLayer, SystemClock};
use prsync::github::GitHubClient;
use prsync::store;
use prsync::sync::{EntityCounts, SyncMode, SyncOptions, SyncOrchestrator, SyncSummary};

use crate::config::Config;

/// Command-line overrides for a sync run.
#[derive(Debug, Default)]
pub(crate) struct SyncArgs {
    pub organizations: Vec<String>,
    pub full: bool,
    pub concurrent: bool,
    pub pool_size: Option<usize>,
    pub verbose: bool,
}

/// Merge flags over configured defaults.
fn sync_options(args: &SyncArgs, config: &Config) -> SyncOptions {
    SyncOptions {
        mode: if args.full {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        },
        concurrent: args.concurrent || config.sync.concurrent,
        pool_size: args.pool_size.unwrap_or(config.sync.pool_size).max(1),
        review_fanout_threshold: config.sync.review_fanout_threshold,
        verbose: args.verbose || config.sync.verbose,
    }
}

fn access_config(options: &SyncOptions, config: &Config) -> AccessConfig {
    let mut access = AccessConfig::default().with_concurrency(options.concurrent);
    access.cache.ttl = config.sync.cache_ttl();
    access.governor.requests_per_second = config.sync.requests_per_second;
    access
}

fn organizations(args: &SyncArgs, config: &Config) -> Vec<String> {
    if args.organizations.is_empty() {
        config.sync.organizations.clone()
    } else {
        args.organizations.clone()
    }
}

/// Handle the sync command.
pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    database_url: &str,
) -> Result<SyncSummary, Box<dyn std::error::Error>> {
    let orgs = organizations(&args, config);
    if orgs.is_empty() {
        return Err("No organizations given. Pass them as arguments or set sync.organizations.".into());
    }

    let token = config
        .github_token()
        .ok_or("No GitHub token configured. Set github.token or GITHUB_TOKEN.")?;
    let options = sync_options(&args, config);

    let pool_size = if options.concurrent {
        options.pool_size
    } else {
        1
    };
    let db = prsync::connect_and_migrate_with_pool(database_url, pool_size as u32).await?;
    let db = Arc::new(db);

    let client = Arc::new(GitHubClient::new(&token)?);
    let access = AccessLayer::new(client, Arc::new(SystemClock), access_config(&options, config));

    let orchestrator = SyncOrchestrator::builder()
        .access(Arc::new(access))
        .database(Arc::clone(&db))
        .options(options.clone())
        .build()?;

    println!(
        "{} {} organization(s) ({}, {})",
        style("Syncing").cyan().bold(),
        orgs.len(),
        if options.mode.is_full() { "full" } else { "incremental" },
        if options.concurrent {
            format!("{} workers", options.pool_size)
        } else {
            "sequential".to_string()
        },
    );

    let started = Instant::now();
    let summary = orchestrator.sync_organizations(&orgs).await?;
    let elapsed = started.elapsed();

    print_summary(&summary, &db).await?;

    if summary.errors.is_empty() {
        println!(
            "{} in {:.1}s",
            style("Done").green().bold(),
            elapsed.as_secs_f64()
        );
    } else {
        println!(
            "{} in {:.1}s with {} error(s):",
            style("Done").yellow().bold(),
            elapsed.as_secs_f64(),
            summary.errors.len()
        );
        for error in &summary.errors {
            println!("  {} {}", style("•").red(), error);
        }
    }

    if let Some(message) = organization_failures(&summary) {
        return Err(message.into());
    }
    Ok(summary)
}

/// Failure message when whole organizations were abandoned.
fn organization_failures(summary: &SyncSummary) -> Option<String> {
    match summary.organizations_failed {
        0 => None,
        failed => Some(format!(
            "{} of {} organization(s) failed to sync",
            failed,
            failed + summary.organizations
        )),
    }
}

/// One row of the summary table.
#[derive(Debug, tabled::Tabled)]
struct SummaryRow {
    #[tabled(rename = "Entity")]
    entity: &'static str,
    #[tabled(rename = "Synced")]
    synced: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Stored")]
    stored: u64,
}

impl SummaryRow {
    fn new(entity: &'static str, counts: EntityCounts, stored: u64) -> Self {
        Self {
            entity,
            synced: counts.synced,
            skipped: counts.skipped,
            failed: counts.failed,
            stored,
        }
    }
}

async fn print_summary(
    summary: &SyncSummary,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = vec![
        SummaryRow::new(
            "repositories",
            summary.repositories,
            store::repositories::count(db).await?,
        ),
        SummaryRow::new(
            "pull requests",
            summary.pull_requests,
            store::pull_requests::count(db).await?,
        ),
        SummaryRow::new("reviews", summary.reviews, store::reviews::count(db).await?),
        SummaryRow::new("users", summary.users, store::users::count(db).await?),
    ];

    let mut table = tabled::Table::new(rows);
    table.with(tabled::settings::Style::rounded());
    println!("{}", table);
    Ok(())
}
