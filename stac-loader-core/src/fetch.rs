//! Bounded-concurrency discovery and fetch.
//!
//! Keys are streamed from the store's listing; each eligible key becomes one
//! fetch-and-normalize unit. A semaphore caps the number of units in flight.
//! Every unit settles to `Some(document)` or `None` and the batch is returned
//! only after all of them have settled.

use std::sync::Arc;

use futures::future::join_all;
use futures::TryStreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace};

use crate::contract::{DocumentStore, StoreError};
use crate::document::{is_document_key, Batch, StacDocument};
use crate::normalize::normalize;

/// Default ceiling on concurrently outstanding fetches.
pub const DEFAULT_CONCURRENCY: usize = 25;

/// Discover every document under `root` and fetch-and-normalize each one.
///
/// Read and parse failures become absent slots. Only a listing failure is
/// returned as an error.
pub async fn collect_documents<S>(
    store: &S,
    root: &str,
    concurrency: usize,
) -> Result<Batch, StoreError>
where
    S: DocumentStore + ?Sized,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    info!(root, concurrency = concurrency.max(1), "[FETCH] Listing documents");

    let mut units = Vec::new();
    let mut listing = store.list(root);
    while let Some(key) = listing.try_next().await.map_err(|e| {
        error!(root, error = %e, "[FETCH][ERROR] Listing failed");
        e
    })? {
        if !is_document_key(&key) {
            trace!(key = %key, "[FETCH] Skipping non-document key");
            continue;
        }
        let permits = Arc::clone(&permits);
        units.push(async move {
            // The semaphore is never closed, so acquire only fails if that changes.
            let _permit = permits.acquire().await.ok()?;
            fetch_one(store, &key).await
        });
    }

    info!(root, discovered = units.len(), "[FETCH] Discovery complete, awaiting fetches");
    let slots = join_all(units).await;
    let batch = Batch { slots };
    info!(
        root,
        discovered = batch.len(),
        dropped = batch.dropped(),
        "[FETCH] All fetches settled"
    );
    Ok(batch)
}

async fn fetch_one<S>(store: &S, key: &str) -> Option<StacDocument>
where
    S: DocumentStore + ?Sized,
{
    trace!(key, "File:Read");
    let raw = match store.read(key).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(key, error = %e, "File:Read:Failed");
            return None;
        }
    };
    let doc = normalize(&raw, key, |dir, relative| store.join(dir, relative));
    if doc.is_none() {
        debug!(key, "File:Dropped");
    }
    doc
}
