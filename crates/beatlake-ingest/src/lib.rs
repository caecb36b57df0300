//! Beatlake Ingest Library
//!
//! Incremental ingestion of music data from third-party APIs into Parquet
//! snapshots kept in S3-compatible object storage.
//!
//! # Supported Data Sources
//!
//! - **YouTube**: genre searches and per-video statistics
//! - **Spotify**: catalog search and track details
//! - **Deezer**: charts with their albums, genres with their artists' top tracks
//!
//! Each run searches the source, works out which discovered ids have no
//! detail record yet, fetches only those, merges everything into the
//! existing snapshots and publishes them.
//!
//! # Example
//!
//! ```no_run
//! use beatlake_ingest::config::IngestConfig;
//! use beatlake_ingest::fetcher::Fetcher;
//! use beatlake_ingest::pipeline::Pipeline;
//! use beatlake_ingest::sources::DeezerCharts;
//! use beatlake_ingest::storage::{S3SnapshotStore, Storage, StorageConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let fetcher = Fetcher::new(config.fetch.http_client()?, config.fetch.retry_policy());
//!     let store = Arc::new(S3SnapshotStore::new(Storage::new(StorageConfig::from_env()?)));
//!
//!     let report = Pipeline::new(DeezerCharts::new(config.deezer), fetcher, store)
//!         .run()
//!         .await?;
//!     println!("fetched {} album tracks", report.fetched);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod pipeline;
pub mod silver;
pub mod sources;
pub mod storage;

pub use error::{IngestError, Result};
