//! Document store implementations and selection by source root.
//!
//! - `s3://bucket/prefix` roots are served by [`s3::S3Store`]
//! - anything else is treated as a local directory and served by [`fs::FsStore`]

pub mod fs;
pub mod s3;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

use stac_loader_core::contract::{DocumentStore, StoreError};

use self::fs::FsStore;
use self::s3::{S3Config, S3Store};

pub enum AnyStore {
    S3(S3Store),
    Fs(FsStore),
}

impl AnyStore {
    /// Pick the store for `root`. S3 roots require `s3` settings.
    pub fn for_root(root: &str, s3: Option<&S3Config>) -> Result<Self> {
        if root.starts_with("s3://") {
            let config = s3
                .cloned()
                .context("S3 source root given but no S3 credentials configured")?;
            Ok(AnyStore::S3(S3Store::new(config)))
        } else {
            tracing::info!(root, "Using local filesystem store");
            Ok(AnyStore::Fs(FsStore::new()))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyStore::S3(_) => "s3",
            AnyStore::Fs(_) => "filesystem",
        }
    }
}

#[async_trait]
impl DocumentStore for AnyStore {
    fn list(&self, root: &str) -> BoxStream<'static, Result<String, StoreError>> {
        match self {
            AnyStore::S3(store) => store.list(root),
            AnyStore::Fs(store) => store.list(root),
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self {
            AnyStore::S3(store) => store.read(key).await,
            AnyStore::Fs(store) => store.read(key).await,
        }
    }

    fn join(&self, dir: &str, relative: &str) -> String {
        match self {
            AnyStore::S3(store) => store.join(dir, relative),
            AnyStore::Fs(store) => store.join(dir, relative),
        }
    }
}
