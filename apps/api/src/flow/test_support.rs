//! Deterministic collaborators for flow-level tests.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::artifacts::{Artifact, ArtifactKind, ArtifactRef, ArtifactSink, FsArtifactSink, SinkError};
use crate::cache::MemoryCache;
use crate::documents::{DocumentError, DocumentStore, SourceDocument};
use crate::flow::controller::{Collaborators, FlowController, FlowSettings};
use crate::flow::request::{PathSelector, Request, SourceRef};
use crate::guardrails::test_support::SOURCE_RESUME;
use crate::guardrails::text::normalize_text;
use crate::pipeline::definitions::{GENERATE_RESUME_SITE, REVIEW_RESUME, REVISE_RESUME};
use crate::pipeline::executor::test_support::ScriptedGenerator;

/// Serves one fixed resume for every source ref.
pub struct StaticDocumentStore {
    text: String,
}

impl StaticDocumentStore {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for StaticDocumentStore {
    async fn read(&self, source: &SourceRef) -> Result<SourceDocument, DocumentError> {
        Ok(SourceDocument {
            source_ref: source.clone(),
            bytes: Bytes::from(self.text.clone()),
            text: normalize_text(&self.text),
        })
    }

    fn render(&self, text: &str) -> Bytes {
        Bytes::from(format!("{}\n", normalize_text(text)))
    }
}

/// A sink whose writes always fail.
pub struct FailingSink;

#[async_trait]
impl ArtifactSink for FailingSink {
    fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        PathBuf::from("/unwritable").join(kind.location().1)
    }

    async fn write_batch(&self, _artifacts: Vec<Artifact>) -> Result<Vec<ArtifactRef>, SinkError> {
        Err(SinkError::Task("disk full".to_string()))
    }

    async fn contains(&self, _reference: &ArtifactRef) -> bool {
        false
    }
}

pub struct Fixture {
    pub controller: Arc<FlowController>,
    pub generator: Arc<ScriptedGenerator>,
    pub cache: Arc<MemoryCache>,
    pub dir: TempDir,
}

pub fn fixture(generator: ScriptedGenerator) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FsArtifactSink::new(
        dir.path().join("artifacts"),
        dir.path().join("docs"),
    ));
    build(generator, sink, dir)
}

pub fn fixture_with_sink(generator: ScriptedGenerator, sink: Arc<dyn ArtifactSink>) -> Fixture {
    build(generator, sink, tempfile::tempdir().unwrap())
}

fn build(generator: ScriptedGenerator, sink: Arc<dyn ArtifactSink>, dir: TempDir) -> Fixture {
    let generator = Arc::new(generator);
    let cache = Arc::new(MemoryCache::new());
    let controller = FlowController::new(
        FlowSettings::default(),
        Collaborators {
            generator: generator.clone(),
            cache: cache.clone(),
            sink,
            documents: Arc::new(StaticDocumentStore::new(SOURCE_RESUME)),
        },
    )
    .unwrap();

    Fixture {
        controller: Arc::new(controller),
        generator,
        cache,
        dir,
    }
}

pub fn request(path: PathSelector, text: &str) -> Request {
    Request::new(path, text, SourceRef::new("Resume.pdf"))
}

pub fn revision_reply(text: &str) -> Value {
    json!({
        "final_resume_text": text,
        "feedback_items": [{"area": "impact", "note": "lead with outcomes"}],
        "applied_user_updates": ["tightened bullet points"],
        "skipped_user_updates": []
    })
}

pub fn site_reply() -> Value {
    json!({
        "title": "Jane Doe",
        "html": "<!doctype html><html><head><link rel=\"stylesheet\" href=\"styles.css\"></head>\
                 <body><h1>Jane Doe</h1><p>Senior Software Engineer at Acme Corp</p>\
                 <ul><li>Led migration of billing services to Kubernetes</li>\
                 <li>Built Rust ingestion pipeline on AWS</li></ul>\
                 <script src=\"script.js\"></script></body></html>",
        "css": "body { font-family: system-ui; }",
        "js": "document.documentElement.classList.add('js');"
    })
}

/// Every step succeeds and every stage passes its guardrails.
pub fn happy_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .reply(
            REVIEW_RESUME,
            json!({"feedback_items": [{"area": "impact", "note": "lead with outcomes"}]}),
        )
        .reply(REVISE_RESUME, revision_reply(SOURCE_RESUME))
        .reply(GENERATE_RESUME_SITE, site_reply())
}
