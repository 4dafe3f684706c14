use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use trove_indexer::{IndexerConfig, IndexerEvent, IndexingService, RunOutcome};

/// Crawl the configured sources once and bring the word index up to date
#[derive(Debug, Parser)]
#[command(name = "trove-indexerd", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the indices and the metadata store
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Directory crawled by the files module (repeatable)
    #[arg(short, long = "root", value_name = "PATH")]
    roots: Vec<PathBuf>,

    /// Log every processed item
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<IndexerConfig> {
        let mut config = match &self.config {
            Some(path) => IndexerConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => IndexerConfig::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if !self.roots.is_empty() {
            config.files.roots = self.roots.clone();
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = cli.load_config()?;
    let (mut service, mut events) =
        IndexingService::open(&config).context("Failed to open indexing service")?;

    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                IndexerEvent::Finished { items_indexed } => {
                    info!("Run finished, {items_indexed} items indexed")
                }
                IndexerEvent::IndexUpdated => debug!("Index updated"),
                IndexerEvent::RunningChanged(running) => debug!("Running: {running}"),
                IndexerEvent::Ignored { path } => info!("Ignored {}", path.display()),
            }
        }
    });

    let outcome = tokio::select! {
        outcome = service.run() => Some(outcome),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, flushing and shutting down");
            None
        }
    };

    let items_indexed = service.indexer().items_indexed();
    service.shutdown();
    drop(service);
    listener.await.context("Event listener failed")?;

    match outcome {
        Some(RunOutcome::Finished { items_indexed }) => {
            println!(
                "{} Indexing complete, {} items indexed",
                "✓".bright_green(),
                items_indexed.bright_cyan()
            );
        }
        Some(RunOutcome::Halted) => {
            anyhow::bail!(
                "Index in {} is over its size limit, indexing halted",
                config.data_dir.display()
            );
        }
        Some(RunOutcome::Stopped) | None => {
            println!(
                "{} Indexing stopped, {} items indexed",
                "■".bright_yellow(),
                items_indexed.bright_cyan()
            );
        }
    }

    Ok(())
}
