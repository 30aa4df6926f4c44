//! prsync CLI - incremental pull request sync into SQLite.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::limits::OutputFormat;

#[derive(Parser)]
#[command(name = "prsync")]
#[command(version)]
#[command(about = "Incrementally sync GitHub pull requests and reviews into SQLite")]
#[command(
    long_about = "prsync walks organizations, their repositories, pull requests and reviews \
and mirrors them into a local SQLite database. Later runs only fetch what changed since \
the previous successful sync, and all API access is cached, retried and paced against \
the remaining rate limit quota."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync two organizations:
        $ prsync sync rust-lang tokio-rs

    Re-fetch everything regardless of previous runs:
        $ prsync sync rust-lang --full

    Use a worker pool of 8:
        $ prsync sync rust-lang --concurrent --pool-size 8

    Show the remaining API quota:
        $ prsync limits

CONFIGURATION
    prsync reads configuration from:
      1. ~/.config/prsync/config.toml (or $XDG_CONFIG_HOME/prsync/config.toml)
      2. ./prsync.toml
      3. Environment variables (PRSYNC_* prefix, `__` between sections and keys)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    PRSYNC_DATABASE__URL      Database connection string (default: ~/.local/state/prsync/prsync.db)
    PRSYNC_GITHUB__TOKEN      GitHub personal access token
    GITHUB_TOKEN              Fallback GitHub token
    RUST_LOG                  Log filter (default: prsync=info,prsync_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync organizations into the local database
    Sync {
        /// Organizations to sync (defaults to `sync.organizations` from the config)
        organizations: Vec<String>,

        /// Ignore stored cursors and re-fetch everything
        #[arg(long)]
        full: bool,

        /// Process repositories on a worker pool
        #[arg(short, long)]
        concurrent: bool,

        /// Worker pool size in concurrent mode
        #[arg(short = 'p', long)]
        pool_size: Option<usize>,

        /// Log every skipped entity and per-entity progress
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show the GitHub API rate limit
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Drop all tables and reapply all migrations
    Fresh,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "prsync=debug,prsync_cli=debug"
    } else {
        "prsync=info,prsync_cli=info"
    };
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_filter),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_database_dir(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = config::sqlite_file_path(database_url) else {
        return Ok(());
    };

    if db_path.is_relative() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Sync { verbose: true, .. });
    init_tracing(verbose);

    // Load configuration (config files -> env vars -> defaults)
    let config = config::Config::load();

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database location; set database.url")?;
    ensure_database_dir(&database_url)?;

    match cli.command {
        Commands::Sync {
            organizations,
            full,
            concurrent,
            pool_size,
            verbose,
        } => {
            let args = commands::sync::SyncArgs {
                organizations,
                full,
                concurrent,
                pool_size,
                verbose,
            };
            let summary = commands::sync::handle_sync(args, &config, &database_url).await?;
            if summary.has_failures() {
                tracing::warn!(
                    errors = summary.errors.len(),
                    "Sync completed with failed branches; their cursors were left in place"
                );
            }
        }
        Commands::Limits { output } => {
            commands::limits::handle_limits(output, &config).await?;
        }
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
    }

    Ok(())
}
