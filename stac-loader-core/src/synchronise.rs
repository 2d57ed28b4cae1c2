//! High-level pipeline: discover → normalize → bulk index.
//!
//! [`synchronise`] wires a [`DocumentStore`] and an [`IndexClient`] together
//! for one run described by an [`IngestConfig`]:
//!   - lists and fetches every `.json` document under the source root, at most
//!     `concurrency` at a time, normalizing each one
//!   - drops the documents that could not be read, parsed or lacked `stac_version`
//!   - submits the survivors to the target index in one bulk request
//!
//! # Error Handling
//! Per-document and per-operation failures are logged and counted in the
//! [`IngestReport`]; the run continues. Only a listing failure or a failed
//! bulk submission aborts with a [`SynchroniseError`].
//!
//! Re-running is safe: documents are keyed by their source location, so a
//! second run overwrites the first.

use tracing::{error, info};

use crate::bulk::{index_documents, Rejection};
use crate::config::IngestConfig;
use crate::contract::{DocumentStore, IndexClient, IndexError, StoreError};
use crate::fetch::collect_documents;

#[derive(Debug, thiserror::Error)]
pub enum SynchroniseError {
    #[error("failed to list documents under {root}: {source}")]
    Discovery {
        root: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to submit documents to index {index}: {source}")]
    Index {
        index: String,
        #[source]
        source: IndexError,
    },
}

/// Outcome of one run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Eligible keys found under the source root.
    pub discovered: usize,
    /// Documents that survived normalization.
    pub normalized: usize,
    /// Keys excluded before indexing (read, parse or version failures).
    pub dropped: usize,
    /// Documents the index accepted.
    pub indexed: usize,
    pub rejected: Vec<Rejection>,
}

impl IngestReport {
    /// True when every discovered document ended up in the index.
    pub fn is_complete(&self) -> bool {
        self.dropped == 0 && self.rejected.is_empty()
    }
}

pub async fn synchronise<S, C>(
    config: &IngestConfig,
    store: &S,
    index: &C,
) -> Result<IngestReport, SynchroniseError>
where
    S: DocumentStore + ?Sized,
    C: IndexClient + ?Sized,
{
    info!(
        source_root = %config.source_root,
        target_index = %config.target_index,
        "[SYNC] Starting ingestion"
    );

    let batch = collect_documents(store, &config.source_root, config.concurrency)
        .await
        .map_err(|source| SynchroniseError::Discovery {
            root: config.source_root.clone(),
            source,
        })?;

    let mut report = IngestReport {
        discovered: batch.len(),
        dropped: batch.dropped(),
        ..IngestReport::default()
    };
    let documents = batch.into_documents();
    report.normalized = documents.len();
    info!(
        discovered = report.discovered,
        normalized = report.normalized,
        dropped = report.dropped,
        "[SYNC] Normalization complete"
    );

    let indexed = index_documents(index, &config.target_index, documents)
        .await
        .map_err(|source| {
            error!(error = %source, "[SYNC][ERROR] Indexing failed");
            SynchroniseError::Index {
                index: config.target_index.clone(),
                source,
            }
        })?;
    report.indexed = indexed.accepted;
    report.rejected = indexed.rejected;

    info!(
        discovered = report.discovered,
        indexed = report.indexed,
        dropped = report.dropped,
        rejected = report.rejected.len(),
        "[SYNC] Ingestion complete"
    );
    Ok(report)
}
