use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fetch::DEFAULT_CONCURRENCY;

/// What to ingest and where to put it. Built once at startup and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root location to list, e.g. `s3://bucket/prefix` or a local directory.
    pub source_root: String,
    /// Name of the search index receiving the documents.
    pub target_index: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl IngestConfig {
    pub fn new(source_root: impl Into<String>, target_index: impl Into<String>) -> Self {
        Self {
            source_root: source_root.into(),
            target_index: target_index.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            source_root = %self.source_root,
            target_index = %self.target_index,
            concurrency = self.concurrency,
            "Loaded IngestConfig"
        );
        debug!(?self, "IngestConfig loaded (full debug)");
    }
}
