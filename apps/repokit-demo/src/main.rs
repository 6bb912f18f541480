use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use repokit_db::{redact_credentials_in_dsn, CancellationToken, DbHandle};
use runtime::{AppConfig, CliArgs};
use std::path::PathBuf;

mod commands;
mod entities;

use commands::{App, ListArgs};

/// RepoKit demo - paged queries over an authors/posts store
#[derive(Parser)]
#[command(name = "repokit-demo")]
#[command(about = "RepoKit demo - paged queries over an authors/posts store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL (overrides config)
    #[arg(long)]
    database_url: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert sample authors and posts
    Seed {
        #[arg(long, default_value_t = 10)]
        authors: u64,
        #[arg(long, default_value_t = 2)]
        posts_per_author: u64,
    },
    /// Print one page of authors as JSON
    List(ListArgs),
    /// Print a single author as JSON
    Get {
        #[arg(long)]
        id: i64,
        /// Comma-separated relations to load
        #[arg(long)]
        include: Option<String>,
    },
    /// Delete an author and its posts
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        database_url: cli.database_url.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, &config.home_path());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("no command given, see --help");
    };

    let dsn = config.database_url();
    let redacted = redact_credentials_in_dsn(Some(&dsn));
    tracing::info!(dsn = %redacted, "connecting to database");
    let db = DbHandle::connect(&dsn, config.database.connect_opts())
        .await
        .with_context(|| format!("failed to connect to {redacted}"))?;

    let conn = db.sea();
    entities::ensure_schema(&conn)
        .await
        .context("failed to create schema")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let app = App {
        conn,
        cancel,
        default_page_size: config.paging.default_page_size,
    };

    let result = match command {
        Commands::Seed {
            authors,
            posts_per_author,
        } => app.seed(authors, posts_per_author).await,
        Commands::List(list) => app.list(list).await,
        Commands::Get { id, include } => app.get(id, include.as_deref()).await,
        Commands::Delete { id } => app.delete(id).await,
    };

    db.close().await;
    result
}
