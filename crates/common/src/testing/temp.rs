//! Temporary on-disk stores

use tempfile::TempDir;

use crate::storage::{FileStore, StorageResult};

/// Open a [`FileStore`] rooted in a fresh temporary directory
///
/// The directory is deleted when the returned [`TempDir`] is dropped, so
/// keep it alive for as long as the store is used.
pub async fn temp_file_store() -> StorageResult<(TempDir, FileStore)> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::open(dir.path()).await?;
    Ok((dir, store))
}
