//! Document collaborator: reads the source resume and renders the updated one.
//!
//! The core treats documents as opaque content: it sees the raw bytes (for
//! the source digest) and extracted text, never the file format.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::flow::request::SourceRef;
use crate::guardrails::text::normalize_text;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("source document '{path}' could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("text extraction failed for '{path}': {message}")]
    Extraction { path: String, message: String },

    #[error("source document '{0}' contains no text")]
    Empty(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source_ref: SourceRef,
    /// Raw bytes as stored; the source digest is computed over these.
    pub bytes: Bytes,
    /// Extracted and normalized text.
    pub text: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, source: &SourceRef) -> Result<SourceDocument, DocumentError>;

    /// Renders revised text into the updated document's bytes.
    fn render(&self, text: &str) -> Bytes;
}

/// Reads `.pdf` sources with `pdf-extract`, anything else as UTF-8 text.
/// Relative source refs resolve against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentStore {
    base_dir: Option<PathBuf>,
}

impl FsDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, source: &SourceRef) -> PathBuf {
        let path = Path::new(source.as_str());
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, source: &SourceRef) -> Result<SourceDocument, DocumentError> {
        let path = self.resolve(source);
        let shown = path.display().to_string();
        let bytes = Bytes::from(tokio::fs::read(&path).await.map_err(|e| DocumentError::Read {
            path: shown.clone(),
            source: e,
        })?);

        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        let raw_text = if is_pdf {
            let pdf = bytes.clone();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
                .await
                .map_err(|e| DocumentError::Extraction {
                    path: shown.clone(),
                    message: e.to_string(),
                })?
                .map_err(|e| DocumentError::Extraction {
                    path: shown.clone(),
                    message: e.to_string(),
                })?
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let text = normalize_text(&raw_text);
        if text.is_empty() {
            return Err(DocumentError::Empty(shown));
        }
        debug!(path = %shown, chars = text.len(), "source document loaded");

        Ok(SourceDocument {
            source_ref: source.clone(),
            bytes,
            text,
        })
    }

    fn render(&self, text: &str) -> Bytes {
        let mut rendered = normalize_text(text);
        rendered.push('\n');
        Bytes::from(rendered)
    }
}
