//! Beatlake Ingest - music data ingestion tool

use anyhow::{bail, Context, Result};
use beatlake_common::logging::{init_logging, LogConfig, LogLevel};
use beatlake_ingest::config::IngestConfig;
use beatlake_ingest::error::ConfigError;
use beatlake_ingest::fetcher::Fetcher;
use beatlake_ingest::pipeline::{Pipeline, RunReport};
use beatlake_ingest::silver;
use beatlake_ingest::sources::{
    DeezerCharts, DeezerGenres, SourceAdapter, SpotifySource, YoutubeSource,
};
use beatlake_ingest::storage::{
    MemorySnapshotStore, S3SnapshotStore, SnapshotStore, Storage, StorageConfig,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "beatlake-ingest")]
#[command(author, version, about = "Beatlake music data ingestion tool")]
struct Cli {
    /// Data source to ingest
    #[command(subcommand)]
    source: Source,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Keep snapshots in memory instead of object storage
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
enum Source {
    /// Ingest YouTube genre searches and video details
    Youtube,

    /// Ingest Spotify catalog search and track details
    Spotify,

    /// Ingest the Deezer chart and the tracks of its albums
    DeezerCharts,

    /// Ingest Deezer genre artists and their top tracks
    DeezerGenres,

    /// Run every source in turn
    All,

    /// Publish a cleaned copy of the YouTube video snapshot
    CleanYoutube,
}

struct Runner {
    fetcher: Fetcher,
    store: Arc<dyn SnapshotStore>,
    batch_pause: Duration,
}

impl Runner {
    async fn run<S: SourceAdapter>(&self, source: S) -> Result<RunReport> {
        let name = source.name().to_string();
        let report = Pipeline::new(source, self.fetcher.clone(), self.store.clone())
            .with_batch_pause(self.batch_pause)
            .run()
            .await
            .with_context(|| format!("Ingestion of {} failed", name))?;

        for published in &report.published {
            info!(
                dataset = %published.dataset,
                records = published.records,
                written = published.outcome.is_written(),
                "Snapshot published"
            );
        }
        if report.rate_limited {
            warn!(source = %name, "Run was cut short by rate limiting");
        }
        Ok(report)
    }
}

/// Configuration check of the selected source, before any network call.
///
/// `all` is checked per source at the start of each run so one source with
/// missing credentials does not stop the others.
fn preflight(source: &Source, config: &IngestConfig) -> Result<(), ConfigError> {
    match source {
        Source::Youtube => YoutubeSource::new(config.youtube.clone()).validate(),
        Source::Spotify => config.spotify.validate(),
        Source::DeezerCharts => DeezerCharts::new(config.deezer.clone()).validate(),
        Source::DeezerGenres => DeezerGenres::new(config.deezer.clone()).validate(),
        Source::All | Source::CleanYoutube => Ok(()),
    }
}

async fn open_store(dry_run: bool) -> Result<Arc<dyn SnapshotStore>> {
    if dry_run {
        info!("Dry run: snapshots stay in memory");
        return Ok(Arc::new(MemorySnapshotStore::new()));
    }

    let storage = Storage::new(StorageConfig::from_env()?);
    storage
        .ensure_bucket()
        .await
        .context("Failed to prepare snapshot bucket")?;
    info!(bucket = %storage.bucket(), "Using object storage");
    Ok(Arc::new(S3SnapshotStore::new(storage)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("beatlake-ingest")
        .filter_directives("aws_smithy_runtime=warn,aws_config=warn,hyper=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;
    if let Some(warehouse) = &config.warehouse {
        info!(host = %warehouse.host, database = %warehouse.database, "Warehouse configured");
    }

    preflight(&cli.source, &config)?;
    let client = config.fetch.http_client()?;
    let store = open_store(cli.dry_run).await?;
    let runner = Runner {
        fetcher: Fetcher::new(client.clone(), config.fetch.retry_policy()),
        store: store.clone(),
        batch_pause: config.fetch.batch_pause(),
    };

    match cli.source {
        Source::Youtube => {
            info!("Ingesting YouTube data");
            runner.run(YoutubeSource::new(config.youtube)).await?;
        },
        Source::Spotify => {
            info!("Ingesting Spotify data");
            runner
                .run(SpotifySource::new(config.spotify, client))
                .await?;
        },
        Source::DeezerCharts => {
            info!("Ingesting Deezer charts");
            runner.run(DeezerCharts::new(config.deezer)).await?;
        },
        Source::DeezerGenres => {
            info!("Ingesting Deezer genres");
            runner.run(DeezerGenres::new(config.deezer)).await?;
        },
        Source::All => {
            let results = [
                ("youtube", runner.run(YoutubeSource::new(config.youtube)).await),
                (
                    "spotify",
                    runner.run(SpotifySource::new(config.spotify, client)).await,
                ),
                (
                    "deezer_charts",
                    runner.run(DeezerCharts::new(config.deezer.clone())).await,
                ),
                ("deezer_genres", runner.run(DeezerGenres::new(config.deezer)).await),
            ];

            let mut failed = Vec::new();
            for (name, result) in results {
                if let Err(err) = result {
                    error!(source = name, error = %format!("{:#}", err), "Source failed");
                    failed.push(name);
                }
            }
            if !failed.is_empty() {
                bail!("{} source(s) failed: {}", failed.len(), failed.join(", "));
            }
        },
        Source::CleanYoutube => {
            info!("Cleaning YouTube videos");
            silver::clean_youtube_videos(store.as_ref()).await?;
        },
    }

    info!("Ingestion complete");
    Ok(())
}
