//! Artifacts: the externally visible outputs of an accepted run.
//!
//! Every artifact kind has exactly one well-known location under either the
//! artifacts directory or the site output directory. Writes go through an
//! `ArtifactSink`, which makes a batch visible all at once or not at all.

pub mod build;
pub mod sink;

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::flow::fingerprint::sha256_hex;

pub use build::{build_artifacts, BuildContext};
pub use sink::{ArtifactSink, FsArtifactSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    UpdatedDocument,
    ReviewRecord,
    /// The review's feedback items alone, for reading without the run metadata.
    FeedbackText,
    BuildMetadata,
    SiteHtml,
    SiteStylesheet,
    SiteScript,
    SiteBuildMetadata,
}

/// Which output directory an artifact lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRoot {
    Artifacts,
    Site,
}

impl ArtifactKind {
    pub fn location(&self) -> (ArtifactRoot, &'static str) {
        match self {
            ArtifactKind::UpdatedDocument => (ArtifactRoot::Artifacts, "resume_updated.txt"),
            ArtifactKind::ReviewRecord => (ArtifactRoot::Artifacts, "review.json"),
            ArtifactKind::FeedbackText => (ArtifactRoot::Artifacts, "feedback.txt"),
            ArtifactKind::BuildMetadata => (ArtifactRoot::Artifacts, "build_meta.json"),
            ArtifactKind::SiteHtml => (ArtifactRoot::Site, "index.html"),
            ArtifactKind::SiteStylesheet => (ArtifactRoot::Site, "styles.css"),
            ArtifactKind::SiteScript => (ArtifactRoot::Site, "script.js"),
            ArtifactKind::SiteBuildMetadata => (ArtifactRoot::Site, "build_meta.json"),
        }
    }
}

/// An artifact's contents, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub contents: Bytes,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, contents: impl Into<Bytes>) -> Self {
        Self {
            kind,
            contents: contents.into(),
        }
    }

    pub fn digest(&self) -> String {
        sha256_hex(&self.contents)
    }
}

/// Where an artifact was written and what it contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_kind_has_a_distinct_location() {
        let kinds = [
            ArtifactKind::UpdatedDocument,
            ArtifactKind::ReviewRecord,
            ArtifactKind::FeedbackText,
            ArtifactKind::BuildMetadata,
            ArtifactKind::SiteHtml,
            ArtifactKind::SiteStylesheet,
            ArtifactKind::SiteScript,
            ArtifactKind::SiteBuildMetadata,
        ];
        let locations: HashSet<_> = kinds
            .iter()
            .map(|k| {
                let (root, name) = k.location();
                (root == ArtifactRoot::Site, name)
            })
            .collect();
        assert_eq!(locations.len(), kinds.len());
    }
}
