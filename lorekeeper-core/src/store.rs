//! JSON document persistence.
//!
//! Every document (session, NPC store, PC store) is read whole and written
//! whole. Writes go to a sibling temp file which is synced and then renamed
//! over the target, so an interrupted write never leaves a torn document.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Errors from document persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read and deserialize a document.
///
/// Returns `Ok(None)` when the file does not exist or contains only
/// whitespace.
pub async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::json(path, e))
}

/// Serialize a document and atomically replace `path` with it.
///
/// The parent directory must already exist; see [`ensure_parent_dir`].
pub async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(document).map_err(|e| StoreError::json(path, e))?;
    let tmp = temp_path(path);

    if let Err(e) = replace_with(&tmp, path, content.as_bytes()).await {
        // Whatever step failed, no temp sibling is left behind.
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "temp file not removed");
            }
        }
        return Err(e);
    }

    tracing::debug!(path = %path.display(), bytes = content.len(), "document written");
    Ok(())
}

/// Write `bytes` to `tmp`, sync it, then rename it over `path`.
async fn replace_with(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(tmp)
        .await
        .map_err(|e| StoreError::io(tmp, e))?;
    file.write_all(bytes).await.map_err(|e| StoreError::io(tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(tmp, e))?;
    drop(file);

    fs::rename(tmp, path).await.map_err(|e| StoreError::io(path, e))
}

/// Create the parent directory of `path` if it is missing.
pub async fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e)),
        _ => Ok(()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
