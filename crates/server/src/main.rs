// crates/server/src/main.rs
//! `pickmed` binary: the long-running search daemon, plus the short-lived
//! `refresh` mode the session-start hook spawns to rebuild the index and
//! git frecency out of process.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pickme_core::Config;
use pickme_server::DaemonOptions;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "pickmed",
    version,
    about = "pickme file-search daemon and background indexer"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the search daemon (default).
    Serve {
        /// Socket path override.
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Idle shutdown timeout in seconds.
        #[arg(long)]
        idle_timeout_secs: Option<u64>,
    },
    /// Refresh the index for every configured root, rebuild git frecency,
    /// and exit.
    Refresh,
    /// Print files changed within a window (e.g. `30m`, `24h`, `2w`),
    /// newest roots first. Used by the session-start hook.
    Recent {
        /// Root to scan; defaults to every configured root.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Change window.
        #[arg(long, default_value = "24h")]
        within: String,
        /// Maximum number of paths to print.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::load()?;

    let command = cli.command.unwrap_or(Command::Serve {
        socket: None,
        idle_timeout_secs: None,
    });
    match command {
        Command::Serve {
            socket,
            idle_timeout_secs,
        } => serve(config, socket, idle_timeout_secs).await,
        Command::Refresh => refresh(config).await,
        Command::Recent {
            root,
            within,
            limit,
        } => recent(config, root, &within, limit).await,
    }
}

async fn serve(
    config: Config,
    socket: Option<PathBuf>,
    idle_timeout_secs: Option<u64>,
) -> Result<()> {
    let mut options = DaemonOptions {
        socket_path: socket,
        ..Default::default()
    };
    if let Some(secs) = idle_timeout_secs {
        options.idle_timeout = Duration::from_secs(secs);
    }
    pickme_server::run(config, options).await?;
    Ok(())
}

async fn refresh(config: Config) -> Result<()> {
    let db = pickme_db::Database::open_default().await?;

    let outcome = pickme_db::indexer::refresh_all(&db, &config).await;
    for root in &outcome.roots {
        tracing::info!(
            root = %root.root,
            indexed = root.files_indexed,
            skipped = root.files_skipped,
            pruned = root.files_pruned,
            errors = root.errors.len(),
            "root refreshed"
        );
        for error in &root.errors {
            tracing::warn!(root = %root.root, error = %error, "refresh error");
        }
    }

    for root in config.expanded_roots() {
        match pickme_db::frecency::build_frecency(&db, &root).await {
            Ok(written) if written > 0 => {
                tracing::info!(root = %root.display(), written, "frecency updated");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(root = %root.display(), error = %e, "frecency failed"),
        }
    }

    tracing::info!(elapsed_ms = outcome.elapsed_ms, "refresh complete");
    Ok(())
}

async fn recent(
    config: Config,
    root: Option<PathBuf>,
    within: &str,
    limit: Option<usize>,
) -> Result<()> {
    let roots = match root {
        Some(root) => vec![root],
        None => config.expanded_roots(),
    };
    let exclude = &config.index.exclude.patterns;
    for root in roots {
        let paths = pickme_db::indexer::recent_files(&root, within, limit, exclude).await?;
        for path in paths {
            println!("{}", path.display());
        }
    }
    Ok(())
}
