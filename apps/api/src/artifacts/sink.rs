//! Artifact Sink: all-or-nothing batch writes to the well-known locations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::artifacts::{Artifact, ArtifactKind, ArtifactRef, ArtifactRoot};
use crate::flow::fingerprint::sha256_hex;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact write task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Destination of an artifact kind. Fixed for the lifetime of the sink.
    fn path_for(&self, kind: ArtifactKind) -> PathBuf;

    /// References the batch will have once written. Writes nothing.
    fn plan(&self, artifacts: &[Artifact]) -> Vec<ArtifactRef> {
        artifacts
            .iter()
            .map(|a| ArtifactRef {
                kind: a.kind,
                path: self.path_for(a.kind),
                sha256: a.digest(),
            })
            .collect()
    }

    /// Writes every artifact or none of them.
    async fn write_batch(&self, artifacts: Vec<Artifact>) -> Result<Vec<ArtifactRef>, SinkError>;

    /// True when the referenced artifact exists with the referenced contents.
    async fn contains(&self, reference: &ArtifactRef) -> bool;
}

/// Filesystem sink rooted at the artifacts and site output directories.
///
/// Batches publish one at a time: the destinations always hold a single
/// batch, never files from two runs. Clones share the publish lock.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    artifacts_dir: PathBuf,
    site_dir: PathBuf,
    publish: Arc<Mutex<()>>,
}

impl FsArtifactSink {
    pub fn new(artifacts_dir: impl Into<PathBuf>, site_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            site_dir: site_dir.into(),
            publish: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        let (root, name) = kind.location();
        match root {
            ArtifactRoot::Artifacts => self.artifacts_dir.join(name),
            ArtifactRoot::Site => self.site_dir.join(name),
        }
    }

    async fn write_batch(&self, artifacts: Vec<Artifact>) -> Result<Vec<ArtifactRef>, SinkError> {
        let refs = self.plan(&artifacts);
        let targets: Vec<(PathBuf, Artifact)> = refs
            .iter()
            .map(|r| r.path.clone())
            .zip(artifacts)
            .collect();

        // Held until the blocking write finishes, even if this future is dropped.
        let publishing = self.publish.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _publishing = publishing;
            write_all_or_nothing(targets)
        })
        .await
        .map_err(|e| SinkError::Task(e.to_string()))??;

        info!(count = refs.len(), "artifacts written");
        Ok(refs)
    }

    async fn contains(&self, reference: &ArtifactRef) -> bool {
        match tokio::fs::read(&reference.path).await {
            Ok(bytes) => sha256_hex(&bytes) == reference.sha256,
            Err(_) => false,
        }
    }
}

/// Stages every file next to its destination, then renames them all into place.
/// A staging failure drops the temp files and leaves the destinations untouched.
fn write_all_or_nothing(targets: Vec<(PathBuf, Artifact)>) -> Result<(), SinkError> {
    let mut staged = Vec::with_capacity(targets.len());

    for (path, artifact) in targets {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&artifact.contents).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        staged.push((tmp, path));
    }

    for (tmp, path) in staged {
        debug!(path = %path.display(), "publishing artifact");
        tmp.persist(&path).map_err(|e| SinkError::Io {
            path: path.clone(),
            source: e.error,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<Artifact> {
        vec![
            Artifact::new(ArtifactKind::UpdatedDocument, "Jane Doe\nEngineer"),
            Artifact::new(ArtifactKind::SiteHtml, "<html></html>"),
        ]
    }

    #[tokio::test]
    async fn test_write_batch_lands_files_at_fixed_locations() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path().join("artifacts"), dir.path().join("docs"));

        let refs = sink.write_batch(batch()).await.unwrap();
        assert_eq!(refs[0].path, dir.path().join("artifacts/resume_updated.txt"));
        assert_eq!(refs[1].path, dir.path().join("docs/index.html"));
        assert_eq!(
            std::fs::read_to_string(&refs[0].path).unwrap(),
            "Jane Doe\nEngineer"
        );
        for r in &refs {
            assert!(sink.contains(r).await);
        }
        assert_eq!(refs, sink.plan(&batch()));
    }

    #[tokio::test]
    async fn test_contains_detects_missing_and_modified_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path().join("artifacts"), dir.path().join("docs"));
        let refs = sink.write_batch(batch()).await.unwrap();

        std::fs::write(&refs[0].path, "tampered").unwrap();
        std::fs::remove_file(&refs[1].path).unwrap();
        assert!(!sink.contains(&refs[0]).await);
        assert!(!sink.contains(&refs[1]).await);
    }

    #[tokio::test]
    async fn test_failed_staging_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // The site root is a regular file, so staging into it fails.
        let blocked = dir.path().join("docs");
        std::fs::write(&blocked, "not a directory").unwrap();
        let sink = FsArtifactSink::new(dir.path().join("artifacts"), &blocked);

        let err = sink.write_batch(batch()).await.unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
        assert!(!dir.path().join("artifacts/resume_updated.txt").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_never_mix() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FsArtifactSink::new(dir.path().join("artifacts"), dir.path().join("docs")));

        let run = |tag: &'static str| {
            vec![
                Artifact::new(ArtifactKind::UpdatedDocument, format!("resume {tag}")),
                Artifact::new(ArtifactKind::SiteHtml, format!("<html>{tag}</html>")),
                Artifact::new(ArtifactKind::SiteStylesheet, format!("/* {tag} */")),
            ]
        };

        let mut handles = Vec::new();
        for i in 0..16 {
            let sink = Arc::clone(&sink);
            let batch = if i % 2 == 0 { run("first") } else { run("second") };
            handles.push(tokio::spawn(async move { sink.write_batch(batch).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let resume = std::fs::read_to_string(dir.path().join("artifacts/resume_updated.txt")).unwrap();
        let tag = resume.trim_start_matches("resume ");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/index.html")).unwrap(),
            format!("<html>{tag}</html>")
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/styles.css")).unwrap(),
            format!("/* {tag} */")
        );
    }

    #[tokio::test]
    async fn test_clones_share_the_publish_lock() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path().join("artifacts"), dir.path().join("docs"));
        let clone = sink.clone();

        let held = sink.publish.clone().lock_owned().await;
        let pending = tokio::spawn(async move { clone.write_batch(batch()).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert!(!dir.path().join("artifacts/resume_updated.txt").exists());

        drop(held);
        pending.await.unwrap().unwrap();
        assert!(dir.path().join("artifacts/resume_updated.txt").exists());
    }
}
