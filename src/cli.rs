///
/// This module implements the CLI interface for stac-loader: command parsing,
/// configuration loading, adapter construction and the async `run` entrypoint.
///
/// All pipeline logic (normalization, fetching, bulk indexing) lives in the
/// [`stac-loader-core`] crate. This module is CLI glue and orchestration.
///
/// ## How To Use
/// - For command-line users: run the `stac-loader` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`stac-loader-core`]: ../../stac-loader-core/
use anyhow::Result;
use clap::{Parser, Subcommand};
use stac_loader_core::synchronise::{synchronise, IngestReport};

use crate::elastic::ElasticClient;
use crate::load_config::{load_config, ConfigOverrides};
use crate::store::AnyStore;

/// Exit code for a strict run that dropped or failed to index documents.
pub const INCOMPLETE_EXIT_CODE: u8 = 2;

/// CLI for stac-loader: load STAC documents from object storage into Elasticsearch.
#[derive(Parser)]
#[clap(
    name = "stac-loader",
    version,
    about = "Normalize STAC documents from S3 and bulk-load them into Elasticsearch"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List, normalize and index every STAC document under the source root
    Ingest {
        /// Source root (overrides $S3_SOURCE_BUCKET), e.g. s3://bucket/prefix
        #[clap(long)]
        source: Option<String>,
        /// Target index (overrides $ELASTIC_INDEX)
        #[clap(long)]
        index: Option<String>,
        /// Maximum concurrent fetches (overrides $STAC_CONCURRENCY, default 25)
        #[clap(long)]
        concurrency: Option<usize>,
        /// Exit with code 2 when any document was dropped or rejected
        #[clap(long)]
        strict: bool,
    },
    /// Validate configuration and print the resolved targets without any network access
    Check {
        #[clap(long)]
        source: Option<String>,
        #[clap(long)]
        index: Option<String>,
    },
}

/// What a successful invocation did.
#[derive(Debug)]
pub enum RunOutcome {
    Checked,
    Ingested { report: IngestReport, strict: bool },
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Ingested { report, strict: true } if !report.is_complete() => {
                INCOMPLETE_EXIT_CODE
            }
            _ => 0,
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<RunOutcome> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Ingest {
            source,
            index,
            concurrency,
            strict,
        } => {
            let config = load_config(&ConfigOverrides {
                source,
                index,
                concurrency,
            })?;
            let store = AnyStore::for_root(&config.ingest.source_root, config.s3.as_ref())?;
            let client = ElasticClient::new(&config.elastic)?;
            tracing::info!(command = "ingest", store = store.kind(), "Starting ingestion");

            match synchronise(&config.ingest, &store, &client).await {
                Ok(report) => {
                    tracing::info!(command = "ingest", ?report, "Ingestion complete");
                    println!(
                        "Ingestion complete: discovered={} indexed={} dropped={} rejected={}",
                        report.discovered,
                        report.indexed,
                        report.dropped,
                        report.rejected.len()
                    );
                    Ok(RunOutcome::Ingested { report, strict })
                }
                Err(e) => {
                    tracing::error!(command = "ingest", error = %e, "Ingestion failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Check { source, index } => {
            let config = load_config(&ConfigOverrides {
                source,
                index,
                concurrency: None,
            })?;
            let store = AnyStore::for_root(&config.ingest.source_root, config.s3.as_ref())?;
            let client = ElasticClient::new(&config.elastic)?;
            println!(
                "Configuration OK: source={} ({}) index={} endpoint={} concurrency={}",
                config.ingest.source_root,
                store.kind(),
                config.ingest.target_index,
                client.endpoint(),
                config.ingest.concurrency
            );
            Ok(RunOutcome::Checked)
        }
    }
}
