//! File-backed cache: one JSON document per fingerprint under the cache directory.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::flow::fingerprint::Fingerprint;

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if &entry.fingerprint == fingerprint => Ok(Some(entry)),
            Ok(_) => {
                warn!(path = %path.display(), "cache entry belongs to another fingerprint; ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry; treating as miss");
                Ok(None)
            }
        }
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.fingerprint);
        let dir = self.dir.clone();
        let bytes = serde_json::to_vec_pretty(&entry)?;

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}
