//! Local directory document store.
//!
//! Keys are filesystem paths. Listing walks the tree lazily, one directory per
//! poll, with `tokio::fs`.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use stac_loader_core::contract::{DocumentStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

fn store_error(key: String, source: io::Error) -> StoreError {
    if source.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(key)
    } else {
        StoreError::Io { key, source }
    }
}

/// Files directly inside `dir`; subdirectories are pushed onto `pending`.
async fn read_one_dir(dir: PathBuf, pending: &mut Vec<PathBuf>) -> Result<Vec<String>, StoreError> {
    let key = dir.to_string_lossy().into_owned();
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| store_error(key.clone(), e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| store_error(key.clone(), e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| store_error(path.to_string_lossy().into_owned(), e))?;
        if file_type.is_dir() {
            pending.push(path);
        } else if file_type.is_file() {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

#[async_trait]
impl DocumentStore for FsStore {
    fn list(&self, root: &str) -> BoxStream<'static, Result<String, StoreError>> {
        let root = PathBuf::from(root.trim_end_matches('/'));
        let root = if root.as_os_str().is_empty() {
            PathBuf::from("/")
        } else {
            root
        };
        stream::try_unfold(vec![root], |mut pending| async move {
            let Some(dir) = pending.pop() else {
                return Ok::<_, StoreError>(None);
            };
            tracing::trace!(dir = %dir.display(), "Walking directory");
            let files = read_one_dir(dir, &mut pending).await?;
            Ok(Some((files, pending)))
        })
        .map_ok(|files| stream::iter(files.into_iter().map(Ok::<String, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(key)
            .await
            .map_err(|e| store_error(key.to_string(), e))
    }
}
