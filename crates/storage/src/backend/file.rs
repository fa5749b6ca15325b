//! Filesystem backend: one `<name>.json` file per document under a root.
//!
//! Writes go to a temp file in the same directory, are fsynced, then
//! renamed over the target. Rename within a directory is atomic, so a reader
//! sees either the old document or the new one, and a crash before the
//! rename leaves only an orphaned `.{name}.*.tmp` file behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_name, StorageBackend};
use crate::error::StorageError;

/// Stores each document as pretty-printed JSON under a root directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root`. The directory must already exist;
    /// [`StorageRootResolver`](crate::StorageRootResolver) creates and probes it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileBackend { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed file for a document.
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_name(name)?;
        let path = self.document_path(name);

        tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::unavailable(path, e)),
        })
        .await
        .map_err(|e| StorageError::Backend(format!("task join error: {e}")))?
    }

    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_name(name)?;
        let root = self.root.clone();
        let path = self.document_path(name);
        let prefix = format!(".{name}.");

        tokio::task::spawn_blocking(move || write_atomic(&root, &path, &prefix, &bytes))
            .await
            .map_err(|e| StorageError::Backend(format!("task join error: {e}")))?
    }

    fn locate(&self, name: &str) -> String {
        self.document_path(name).display().to_string()
    }
}

fn write_atomic(root: &Path, path: &Path, prefix: &str, bytes: &[u8]) -> Result<(), StorageError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(root)
        .map_err(|e| StorageError::unavailable(root, e))?;

    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StorageError::unavailable(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| StorageError::unavailable(path, e.error))?;

    // Make the rename itself durable.
    #[cfg(unix)]
    if let Ok(dir) = fs::File::open(root) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn file_backend_passes_conformance() {
        let dirs = std::sync::Mutex::new(Vec::new());
        let report = run_conformance_suite(|| {
            let dir = tempfile::tempdir().unwrap();
            let backend = FileBackend::new(dir.path());
            dirs.lock().unwrap().push(dir);
            async move { backend }
        })
        .await;
        assert!(report.is_clean(), "{report}");
    }

    #[tokio::test]
    async fn document_is_written_as_named_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend
            .store("outreach_queue", b"{\"next_id\":1}".to_vec())
            .await
            .unwrap();

        let on_disk = fs::read_to_string(dir.path().join("outreach_queue.json")).unwrap();
        assert_eq!(on_disk, "{\"next_id\":1}");
    }

    #[tokio::test]
    async fn no_temp_files_left_after_store() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.store("titles", b"{}".to_vec()).await.unwrap();
        backend.store("titles", b"{\"a\":1}".to_vec()).await.unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["titles.json".to_string()]);
    }

    #[tokio::test]
    async fn crash_before_rename_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend
            .store("outreach_sent", b"{\"1\":\"committed\"}".to_vec())
            .await
            .unwrap();

        // A write that died after filling its temp file but before the rename.
        fs::write(
            dir.path().join(".outreach_sent.a1b2c3.tmp"),
            b"{\"1\":\"committed\",\"2\":\"half-wri",
        )
        .unwrap();

        let loaded = backend.load("outreach_sent").await.unwrap().unwrap();
        assert_eq!(loaded, b"{\"1\":\"committed\"}".to_vec());
    }

    #[tokio::test]
    async fn missing_root_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("does-not-exist"));
        let result = backend.store("titles", b"{}".to_vec()).await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
    }

    #[test]
    fn locate_points_at_json_file() {
        let backend = FileBackend::new("/srv/bot");
        assert_eq!(backend.locate("outreach_dead"), "/srv/bot/outreach_dead.json");
    }
}
