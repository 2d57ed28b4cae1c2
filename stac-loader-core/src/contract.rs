//! # contract: the two external capabilities the pipeline depends on
//!
//! This module defines the traits the core drives but never implements against
//! a real backend:
//!
//! - [`DocumentStore`]: lists keys under a root and reads a key's bytes
//!   (S3, local directory, in-memory test double).
//! - [`IndexClient`]: accepts one bulk submission and reports per-document
//!   acceptance or rejection (Elasticsearch, mocks).
//!
//! Both traits are `Send + Sync`, async, and annotated for `mockall` so tests
//! can build deterministic doubles. Concrete network clients live in the
//! `stac-loader` crate.

use async_trait::async_trait;
use futures::stream::BoxStream;
use mockall::automock;

/// Failure to list or read from a document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("i/o error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {key} failed: {message}")]
    Http { key: String, message: String },
}

/// Failure of a bulk submission as a whole. Per-document rejections are not errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("bulk request failed: {0}")]
    Transport(String),
    #[error("bulk request returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed bulk response: {0}")]
    Response(String),
}

/// One index operation: write `body` into `index` under the identity `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub id: String,
    pub body: serde_json::Value,
}

/// Per-document outcome reported by the index service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkItemResult {
    Accepted { id: String },
    Rejected { id: String, status: u16, reason: String },
}

impl BulkItemResult {
    pub fn id(&self) -> &str {
        match self {
            BulkItemResult::Accepted { id } | BulkItemResult::Rejected { id, .. } => id,
        }
    }
}

/// Source of raw STAC documents.
///
/// `list` is a fresh scan on every call: no caching, no ordering guarantee.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lazily enumerate every key under `root`.
    fn list(&self, root: &str) -> BoxStream<'static, Result<String, StoreError>>;

    /// Read the full content of `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Resolve `relative` against the directory `dir`, using this store's key convention.
    fn join(&self, dir: &str, relative: &str) -> String {
        crate::document::join_key(dir, relative)
    }
}

/// Destination search index.
///
/// The implementor owns its connection and authentication handshake.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Submit all operations and report one result per operation.
    ///
    /// Returns `Err` only when the submission itself could not be completed.
    async fn bulk(&self, operations: Vec<BulkOperation>) -> Result<Vec<BulkItemResult>, IndexError>;
}
