//! State file location, loading and atomic persistence

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use stack_ledger_common::defaults::{ERROR_LOG_FILE_NAME, STATE_FILE_NAME};
use tempfile::NamedTempFile;
use tracing::debug;

use super::StoreError;
use super::types::StoreDocument;

/// Get the per-stack data directory, creating it if needed
pub fn stack_data_dir(stack_name: &str) -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", "stack-ledger").context("Failed to get project directories")?;

    let dir = proj_dirs.data_local_dir().join(stack_name);
    fs::create_dir_all(&dir).context("Failed to create state directory")?;

    Ok(dir)
}

/// Get the default state file path for a stack
pub fn default_state_path(stack_name: &str) -> Result<PathBuf> {
    Ok(stack_data_dir(stack_name)?.join(STATE_FILE_NAME))
}

/// Get the default error log path for a stack
pub fn default_error_log_path(stack_name: &str) -> Result<PathBuf> {
    Ok(stack_data_dir(stack_name)?.join(ERROR_LOG_FILE_NAME))
}

/// Read and parse a state file; `Ok(None)` if it does not exist
pub(super) fn read_document(path: &Path) -> Result<Option<StoreDocument>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write the document next to its destination, then rename over it.
///
/// Readers see either the old file or the new one, never a partial write.
pub(super) fn write_document(path: &Path, doc: &StoreDocument) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(doc).map_err(StoreError::Serialize)?;
    write_atomically(path, &json)?;
    debug!(path = %path.display(), resources = doc.resource_count(), "State persisted");
    Ok(())
}

/// Atomically replace `path` with `contents`
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
